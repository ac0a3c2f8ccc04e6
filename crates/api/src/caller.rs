//! Caller identity supplied by the upstream gateway.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::Order;

use crate::error::ApiError;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role; `admin` grants admin access.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Who is making the request. No headers means a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Caller {
    pub user_id: Option<UserId>,
    pub is_admin: bool,
}

impl Caller {
    /// Returns true if the caller may see `order`.
    ///
    /// Guest orders are visible to admins only.
    pub fn can_access(&self, order: &Order) -> bool {
        self.is_admin || self.user_id.is_some_and(|user_id| order.is_owned_by(user_id))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = match parts.headers.get(USER_ID_HEADER) {
            Some(value) => {
                let raw = value
                    .to_str()
                    .map_err(|_| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER} header")))?;
                let id = raw.trim().parse::<UserId>().map_err(|e| {
                    ApiError::BadRequest(format!("Invalid {USER_ID_HEADER} header: {e}"))
                })?;
                Some(id)
            }
            None => None,
        };

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        Ok(Caller { user_id, is_admin })
    }
}
