//! Static catalog of supported gateways and the configuration each one needs.

use std::collections::BTreeMap;

use serde::Serialize;

use super::GatewayId;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GatewayField {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    /// Never returned to shoppers, masked for administrators.
    pub secret: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GatewayDefinition {
    pub id: GatewayId,
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [GatewayField],
}

const fn field(key: &'static str, label: &'static str, required: bool) -> GatewayField {
    GatewayField {
        key,
        label,
        required,
        secret: false,
        default: None,
    }
}

const fn secret(key: &'static str, label: &'static str, required: bool) -> GatewayField {
    GatewayField {
        key,
        label,
        required,
        secret: true,
        default: None,
    }
}

const COD_FIELDS: &[GatewayField] = &[
    GatewayField {
        default: Some("Cash on Delivery"),
        ..field("label", "Checkout label", true)
    },
    field("additionalFee", "Additional fee", false),
];

const WHATSAPP_FIELDS: &[GatewayField] = &[
    field("phone", "WhatsApp number", true),
    field("upiId", "UPI ID", true),
    field("instructions", "Payment instructions", false),
];

const STRIPE_FIELDS: &[GatewayField] = &[
    field("publishableKey", "Publishable key", true),
    secret("secretKey", "Secret key", true),
    secret("webhookSecret", "Webhook signing secret", false),
    field("currency", "Currency", false),
];

const RAZORPAY_FIELDS: &[GatewayField] = &[
    field("keyId", "Key ID", true),
    secret("keySecret", "Key secret", true),
    secret("webhookSecret", "Webhook secret", false),
    GatewayField {
        default: Some("INR"),
        ..field("currency", "Currency", false)
    },
];

pub static GATEWAYS: [GatewayDefinition; 4] = [
    GatewayDefinition {
        id: GatewayId::Cod,
        name: "Cash on Delivery",
        description: "Collect payment in cash when the order is delivered",
        fields: COD_FIELDS,
    },
    GatewayDefinition {
        id: GatewayId::Whatsapp,
        name: "WhatsApp / UPI",
        description: "Shopper pays by UPI and confirms over WhatsApp",
        fields: WHATSAPP_FIELDS,
    },
    GatewayDefinition {
        id: GatewayId::Stripe,
        name: "Stripe",
        description: "Cards and wallets confirmed with Stripe Elements",
        fields: STRIPE_FIELDS,
    },
    GatewayDefinition {
        id: GatewayId::Razorpay,
        name: "Razorpay",
        description: "Razorpay hosted checkout",
        fields: RAZORPAY_FIELDS,
    },
];

pub fn definition(id: GatewayId) -> &'static GatewayDefinition {
    match id {
        GatewayId::Cod => &GATEWAYS[0],
        GatewayId::Whatsapp => &GATEWAYS[1],
        GatewayId::Stripe => &GATEWAYS[2],
        GatewayId::Razorpay => &GATEWAYS[3],
    }
}

impl GatewayDefinition {
    pub fn field(&self, key: &str) -> Option<&'static GatewayField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn is_secret(&self, key: &str) -> bool {
        self.field(key).map(|f| f.secret).unwrap_or(false)
    }

    /// Normalises submitted values against the field schema.
    ///
    /// Values are trimmed, blanks dropped, defaults filled in and unknown keys
    /// rejected. Required fields are only enforced for an enabled gateway so an
    /// administrator can save a draft.
    pub fn normalise(
        &self,
        values: &BTreeMap<String, String>,
        enabled: bool,
    ) -> Result<BTreeMap<String, String>, ServiceError> {
        if let Some(unknown) = values.keys().find(|k| self.field(k).is_none()) {
            return Err(ServiceError::ValidationError(format!(
                "Unknown field '{}' for gateway {}",
                unknown, self.id
            )));
        }

        let mut normalised = BTreeMap::new();
        for field in self.fields {
            let value = values
                .get(field.key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .or(field.default);
            match value {
                Some(v) => {
                    normalised.insert(field.key.to_string(), v.to_string());
                }
                None if enabled && field.required => {
                    return Err(ServiceError::ValidationError(format!(
                        "{} is required to enable {}",
                        field.label, self.name
                    )));
                }
                None => {}
            }
        }
        Ok(normalised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use strum::IntoEnumIterator;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn every_gateway_has_a_definition() {
        for id in GatewayId::iter() {
            assert_eq!(definition(id).id, id);
        }
    }

    #[test]
    fn cod_label_defaults() {
        let cod = definition(GatewayId::Cod);
        let out = cod.normalise(&BTreeMap::new(), true).unwrap();
        assert_eq!(out.get("label").map(String::as_str), Some("Cash on Delivery"));
    }

    #[test]
    fn enabled_gateway_needs_required_fields() {
        let stripe = definition(GatewayId::Stripe);
        let draft = values(&[("publishableKey", "pk_test_1")]);
        assert!(stripe.normalise(&draft, false).is_ok());
        assert_matches!(
            stripe.normalise(&draft, true),
            Err(ServiceError::ValidationError(msg)) if msg.contains("Secret key")
        );
    }

    #[test]
    fn values_are_trimmed_and_unknown_keys_rejected() {
        let razorpay = definition(GatewayId::Razorpay);
        let out = razorpay
            .normalise(
                &values(&[("keyId", "  rzp_test_1 "), ("keySecret", "s3cret\n")]),
                true,
            )
            .unwrap();
        assert_eq!(out["keyId"], "rzp_test_1");
        assert_eq!(out["keySecret"], "s3cret");
        assert_eq!(out["currency"], "INR");

        assert!(razorpay
            .normalise(&values(&[("apiKey", "x")]), false)
            .is_err());
    }

    #[test]
    fn secret_flags() {
        assert!(definition(GatewayId::Stripe).is_secret("secretKey"));
        assert!(!definition(GatewayId::Stripe).is_secret("publishableKey"));
    }
}
