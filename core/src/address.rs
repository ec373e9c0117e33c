//! Shipping and billing addresses.
//!
//! The wire format accepts either a structured object or a plain string; the
//! variant is decided once at the boundary and carried as a tagged value
//! instead of being re-parsed wherever an order is displayed.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};

/// Minimum accepted phone number length for structured addresses.
const MIN_PHONE_LEN: usize = 8;

/// A shipping or billing address as supplied by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Address {
    /// Field-by-field address. Requires a phone number at order time.
    Structured(StructuredAddress),
    /// Opaque pre-formatted address string.
    Raw(String),
}

/// Field-by-field address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAddress {
    /// Street and number.
    pub street: String,
    /// City.
    pub city: String,
    /// State or province.
    pub state: Option<String>,
    /// Postal code.
    pub zip_code: Option<String>,
    /// Country.
    pub country: Option<String>,
}

/// The stored representation of an address, together with the phone number
/// captured at order time for structured addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAddress {
    address: Address,
    phone: Option<String>,
}

impl Address {
    /// Validate this address for order placement and freeze it into its
    /// stored form.
    ///
    /// A structured address requires a phone number of at least 8
    /// characters; a raw address string is stored verbatim and the phone is
    /// optional.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an empty raw address, a
    /// missing phone on a structured address, or a phone shorter than 8
    /// characters.
    pub fn freeze(self, phone: Option<&str>) -> Result<StoredAddress> {
        let phone = phone.map(str::trim).filter(|p| !p.is_empty());
        match &self {
            Self::Raw(s) if s.trim().is_empty() => {
                Err(StoreError::Validation("Shipping address is required".to_string()))
            }
            Self::Structured(_) => match phone {
                Some(p) if p.len() >= MIN_PHONE_LEN => Ok(StoredAddress {
                    address: self,
                    phone: Some(p.to_string()),
                }),
                Some(_) | None => Err(StoreError::Validation(
                    "Valid phone number is required".to_string(),
                )),
            },
            Self::Raw(_) => Ok(StoredAddress {
                address: self,
                phone: phone.map(ToString::to_string),
            }),
        }
    }
}

impl StoredAddress {
    /// Serialize for column storage: structured addresses become a JSON
    /// document carrying the phone, raw addresses are stored as-is.
    #[must_use]
    pub fn to_column(&self) -> String {
        match &self.address {
            Address::Raw(s) => s.clone(),
            Address::Structured(_) => {
                serde_json::to_string(self).unwrap_or_else(|_| self.display_line())
            }
        }
    }

    /// Decode a stored column back into an address. JSON documents produced
    /// by [`Self::to_column`] round-trip; anything else is a raw address.
    #[must_use]
    pub fn from_column(column: &str) -> Self {
        serde_json::from_str(column).unwrap_or_else(|_| Self {
            address: Address::Raw(column.to_string()),
            phone: None,
        })
    }

    /// Human-readable single line, used for CSV export and display.
    #[must_use]
    pub fn display_line(&self) -> String {
        match &self.address {
            Address::Raw(s) => s.clone(),
            Address::Structured(a) => {
                let mut parts: Vec<&str> = vec![a.street.as_str(), a.city.as_str()];
                parts.extend(a.state.as_deref());
                parts.extend(a.zip_code.as_deref());
                parts.extend(a.country.as_deref());
                let mut line = parts.join(", ");
                if let Some(phone) = &self.phone {
                    line.push_str(", Phone: ");
                    line.push_str(phone);
                }
                line
            }
        }
    }

    /// The underlying address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Phone number captured at order time, if any.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}
