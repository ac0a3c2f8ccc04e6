//! Resolves checkout address input to a stored address id.

use common::{AddressId, UserId};
use domain::{AddressInput, AddressKind, NewAddress};
use store::AddressRepository;

use crate::error::{CheckoutError, Result};

/// Turns an [`AddressInput`] into a durable address id.
///
/// Always called inside the checkout transaction, so an inline address
/// created for a failed order is rolled back with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressResolver;

impl AddressResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves `input` for `owner` (`None` for guest checkout).
    ///
    /// - A reference must exist, and must belong to `owner` when the caller is
    ///   authenticated. Guests skip the ownership check.
    /// - Inline fields are validated and stored as a new, non-default address.
    #[tracing::instrument(skip(self, repo, input))]
    pub async fn resolve<R: AddressRepository>(
        &self,
        repo: &mut R,
        owner: Option<UserId>,
        input: &AddressInput,
        kind: AddressKind,
    ) -> Result<AddressId> {
        match input {
            AddressInput::Existing { address_id } => {
                let address = repo.address(*address_id).await?.ok_or_else(|| {
                    CheckoutError::InvalidAddress(format!("address {address_id} does not exist"))
                })?;

                if let Some(owner) = owner
                    && address.user_id != Some(owner)
                {
                    tracing::warn!(%address_id, %owner, "address ownership mismatch");
                    return Err(CheckoutError::Forbidden(format!(
                        "address {address_id} does not belong to the caller"
                    )));
                }

                Ok(address.id)
            }
            AddressInput::Inline(fields) => {
                fields.validate()?;
                let stored = repo
                    .insert_address(NewAddress {
                        user_id: owner,
                        kind,
                        fields: fields.clone(),
                        is_default: false,
                    })
                    .await?;
                tracing::debug!(address_id = %stored.id, "created inline address");
                Ok(stored.id)
            }
        }
    }
}
