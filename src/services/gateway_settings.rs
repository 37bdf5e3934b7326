use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::{info, instrument, warn};

use crate::{
    entities::{gateway_config, GatewayConfig},
    errors::ServiceError,
    payments::{GatewayId, GatewaySettings, PaymentSettings},
};

/// Stores administrator gateway settings and hands out per-request snapshots.
#[derive(Clone)]
pub struct GatewaySettingsService {
    db: Arc<DatabaseConnection>,
}

impl GatewaySettingsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Reads every stored gateway row into a fresh snapshot.
    pub async fn load(&self) -> Result<PaymentSettings, ServiceError> {
        let rows = GatewayConfig::find().all(&*self.db).await?;
        let settings = rows.iter().filter_map(|row| {
            let parsed = GatewaySettings::from_model(row);
            if parsed.is_none() {
                warn!(gateway = %row.id, "ignoring settings for unknown gateway");
            }
            parsed
        });
        Ok(PaymentSettings::new(settings.collect::<Vec<_>>()))
    }

    /// Validates `values` against the registry and upserts the row.
    #[instrument(skip(self, values), fields(gateway = %id))]
    pub async fn save(
        &self,
        id: GatewayId,
        enabled: bool,
        values: &BTreeMap<String, String>,
    ) -> Result<GatewaySettings, ServiceError> {
        let existing = GatewayConfig::find_by_id(id.to_string())
            .one(&*self.db)
            .await?;
        let current = existing
            .as_ref()
            .and_then(GatewaySettings::from_model)
            .unwrap_or_else(|| GatewaySettings::disabled(id));
        let next = current.updated(enabled, values)?;

        match existing {
            Some(row) => {
                let mut active: gateway_config::ActiveModel = row.into();
                active.enabled = Set(next.enabled);
                active.config = Set(next.config_json());
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
            }
            None => {
                gateway_config::ActiveModel {
                    id: Set(id.to_string()),
                    enabled: Set(next.enabled),
                    config: Set(next.config_json()),
                    updated_at: Set(Utc::now()),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        info!(enabled = next.enabled, "gateway settings saved");
        Ok(next)
    }
}
