use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::error;

use super::registry::{self, GatewayField};
use super::GatewayId;
use crate::{entities::gateway_config, errors::ServiceError};

pub const MASKED_SECRET: &str = "********";

/// Snapshot of one gateway's administrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub id: GatewayId,
    pub enabled: bool,
    pub values: BTreeMap<String, String>,
}

impl GatewaySettings {
    pub fn disabled(id: GatewayId) -> Self {
        Self {
            id,
            enabled: false,
            values: BTreeMap::new(),
        }
    }

    /// Reads a stored row. Rows with an unknown id are skipped by the caller.
    pub fn from_model(model: &gateway_config::Model) -> Option<Self> {
        let id = model.id.parse::<GatewayId>().ok()?;
        let values = match &model.config {
            Value::Object(map) => map
                .iter()
                .filter_map(|(k, v)| {
                    let text = match v {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => return None,
                    };
                    Some((k.clone(), text))
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        Some(Self {
            id,
            enabled: model.enabled,
            values,
        })
    }

    pub fn config_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    /// Trimmed, non-empty value for `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Like [`value`](Self::value) but a missing key is a misconfiguration that
    /// surfaces to the shopper as a generic payment failure.
    pub fn require(&self, key: &str) -> Result<&str, ServiceError> {
        self.value(key).ok_or_else(|| {
            error!(gateway = %self.id, field = key, "payment gateway misconfigured");
            ServiceError::PaymentInitFailed
        })
    }

    pub fn currency_or(&self, default: &str) -> String {
        self.value("currency").unwrap_or(default).to_uppercase()
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.value("webhookSecret")
    }

    /// Non-secret fields for shoppers.
    pub fn public_view(&self) -> PublicGateway {
        let def = registry::definition(self.id);
        PublicGateway {
            id: self.id,
            name: def.name,
            description: def.description,
            config: self
                .values
                .iter()
                .filter(|(k, _)| !def.is_secret(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// All fields, with secret values masked.
    pub fn admin_view(&self) -> AdminGateway {
        let def = registry::definition(self.id);
        AdminGateway {
            id: self.id,
            name: def.name,
            enabled: self.enabled,
            fields: def.fields,
            config: self
                .values
                .iter()
                .map(|(k, v)| {
                    let shown = if def.is_secret(k) {
                        MASKED_SECRET.to_string()
                    } else {
                        v.clone()
                    };
                    (k.clone(), shown)
                })
                .collect(),
        }
    }

    /// Applies an administrator update. A secret submitted as the mask keeps its
    /// stored value so the admin form can round-trip without re-entering keys.
    pub fn updated(
        &self,
        enabled: bool,
        submitted: &BTreeMap<String, String>,
    ) -> Result<Self, ServiceError> {
        let def = registry::definition(self.id);
        let merged: BTreeMap<String, String> = submitted
            .iter()
            .map(|(k, v)| {
                let value = if def.is_secret(k) && v == MASKED_SECRET {
                    self.values.get(k).cloned().unwrap_or_default()
                } else {
                    v.clone()
                };
                (k.clone(), value)
            })
            .collect();

        Ok(Self {
            id: self.id,
            enabled,
            values: def.normalise(&merged, enabled)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicGateway {
    pub id: GatewayId,
    pub name: &'static str,
    pub description: &'static str,
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminGateway {
    pub id: GatewayId,
    pub name: &'static str,
    pub enabled: bool,
    pub fields: &'static [GatewayField],
    pub config: BTreeMap<String, String>,
}

/// All gateway settings, read once per request and handed to adapters.
#[derive(Debug, Clone, Default)]
pub struct PaymentSettings {
    gateways: BTreeMap<GatewayId, GatewaySettings>,
}

impl PaymentSettings {
    pub fn new(settings: impl IntoIterator<Item = GatewaySettings>) -> Self {
        Self {
            gateways: settings.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    /// Settings for `id`; an unsaved gateway is disabled.
    pub fn get(&self, id: GatewayId) -> GatewaySettings {
        self.gateways
            .get(&id)
            .cloned()
            .unwrap_or_else(|| GatewaySettings::disabled(id))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &GatewaySettings> {
        self.gateways.values().filter(|g| g.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn stripe() -> GatewaySettings {
        GatewaySettings {
            id: GatewayId::Stripe,
            enabled: true,
            values: [
                ("publishableKey".to_string(), "pk_test_1".to_string()),
                ("secretKey".to_string(), "sk_test_1".to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn public_view_omits_secrets() {
        let view = stripe().public_view();
        assert_eq!(view.config.get("publishableKey").map(String::as_str), Some("pk_test_1"));
        assert!(!view.config.contains_key("secretKey"));
    }

    #[test]
    fn admin_view_masks_secrets() {
        let view = stripe().admin_view();
        assert_eq!(view.config["secretKey"], MASKED_SECRET);
    }

    #[test]
    fn masked_secret_keeps_stored_value() {
        let submitted: BTreeMap<String, String> = [
            ("publishableKey".to_string(), "pk_test_2".to_string()),
            ("secretKey".to_string(), MASKED_SECRET.to_string()),
        ]
        .into_iter()
        .collect();
        let next = stripe().updated(true, &submitted).unwrap();
        assert_eq!(next.value("secretKey"), Some("sk_test_1"));
        assert_eq!(next.value("publishableKey"), Some("pk_test_2"));
    }

    #[test]
    fn reads_numbers_from_stored_json() {
        let model = gateway_config::Model {
            id: "cod".into(),
            enabled: true,
            config: json!({ "label": "Pay at door", "additionalFee": 40 }),
            updated_at: Utc::now(),
        };
        let settings = GatewaySettings::from_model(&model).unwrap();
        assert_eq!(settings.value("additionalFee"), Some("40"));
    }

    #[test]
    fn unknown_gateway_is_disabled() {
        let settings = PaymentSettings::new(vec![stripe()]);
        assert!(!settings.get(GatewayId::Razorpay).enabled);
        assert_eq!(settings.enabled().count(), 1);
    }
}
