//! Postal addresses and the address reference accepted at checkout.

use chrono::{DateTime, Utc};
use common::{AddressId, UserId};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DomainError;

/// Whether an address is used for shipping or billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Shipping,
    Billing,
}

impl AddressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::Shipping => "shipping",
            AddressKind::Billing => "billing",
        }
    }
}

impl std::fmt::Display for AddressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AddressKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipping" => Ok(AddressKind::Shipping),
            "billing" => Ok(AddressKind::Billing),
            other => Err(DomainError::InvalidAddress(format!(
                "unknown address type '{other}'"
            ))),
        }
    }
}

/// Structured postal fields.
///
/// Missing fields deserialize as empty strings so that [`AddressFields::validate`]
/// can report them instead of the JSON decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl AddressFields {
    /// Checks that every required field is present and non-blank.
    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [
            ("full_name", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::InvalidAddress(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// An address supplied at checkout: either a reference to a stored address
/// or a full set of inline fields.
///
/// An object carrying `address_id` is always a reference; a malformed id is
/// a decoding error rather than an incomplete inline address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AddressInput {
    Existing { address_id: AddressId },
    Inline(AddressFields),
}

#[derive(Deserialize)]
struct RawAddressInput {
    #[serde(default)]
    address_id: Option<serde_json::Value>,
    #[serde(flatten)]
    fields: AddressFields,
}

impl<'de> Deserialize<'de> for AddressInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawAddressInput::deserialize(deserializer)?;
        match raw.address_id {
            Some(value) => {
                let address_id = AddressId::deserialize(value)
                    .map_err(|e| D::Error::custom(format!("invalid address_id: {e}")))?;
                Ok(AddressInput::Existing { address_id })
            }
            None => Ok(AddressInput::Inline(raw.fields)),
        }
    }
}

/// A stored address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    /// `None` for addresses captured during guest checkout.
    pub user_id: Option<UserId>,
    pub kind: AddressKind,
    #[serde(flatten)]
    pub fields: AddressFields,
    /// At most one address per (user, kind) carries this flag.
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Data for inserting a new address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
    pub user_id: Option<UserId>,
    pub kind: AddressKind,
    pub fields: AddressFields,
    pub is_default: bool,
}

impl NewAddress {
    /// Builds the address row for the given id and creation time.
    pub fn into_address(self, id: AddressId, created_at: DateTime<Utc>) -> Address {
        Address {
            id,
            user_id: self.user_id,
            kind: self.kind,
            fields: self.fields,
            is_default: self.is_default,
            created_at,
        }
    }
}
