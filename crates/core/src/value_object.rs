//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Fewest digits a destination may carry after normalization.
pub const MIN_DESTINATION_DIGITS: usize = 8;

/// Normalized phone-number-like destination: digits only, country code first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(String);

impl ValueObject for Destination {}

impl Destination {
    /// Normalize free-form input (`"(11) 98888-7777"`, `"+55 11 ..."`).
    ///
    /// Every non-digit is dropped. When `country_code` is given and the
    /// digits do not already start with it, it is prefixed.
    pub fn normalize(raw: &str, country_code: Option<&str>) -> Result<Self, DomainError> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < MIN_DESTINATION_DIGITS {
            return Err(DomainError::InvalidDestination(format!(
                "expected at least {MIN_DESTINATION_DIGITS} digits, got {}",
                digits.len()
            )));
        }

        let normalized = match country_code {
            Some(cc) if !cc.is_empty() && !digits.starts_with(cc) => format!("{cc}{digits}"),
            _ => digits,
        };
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Destination {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
