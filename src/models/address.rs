use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::errors::ServiceError;

/// Field names in the order they are reported back to the shopper.
const REQUIRED_FIELDS: [&str; 5] = ["street", "city", "state", "zip", "country"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingAddress {
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub street: String,
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub city: String,
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub state: String,
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub zip: String,
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("required"))
    } else {
        Ok(())
    }
}

impl ShippingAddress {
    /// Fails with `IncompleteAddress` naming every blank required field.
    pub fn ensure_complete(&self) -> Result<(), ServiceError> {
        match self.validate() {
            Ok(()) => Ok(()),
            Err(errors) => {
                let invalid = errors.field_errors();
                let missing: Vec<String> = REQUIRED_FIELDS
                    .iter()
                    .filter(|field| invalid.contains_key(*field))
                    .map(|field| field.to_string())
                    .collect();
                Err(ServiceError::IncompleteAddress(missing))
            }
        }
    }

    /// Copy with surrounding whitespace removed from every field.
    pub fn trimmed(&self) -> Self {
        Self {
            street: self.street.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            zip: self.zip.trim().to_string(),
            country: self.country.trim().to_string(),
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }
}
