use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    entities::{product, Product},
    errors::ServiceError,
};

/// Read-only access to authoritative product data.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError>;

    async fn get_products(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(product) = self.get_product(*id).await? {
                found.insert(*id, product);
            }
        }
        Ok(found)
    }
}

#[derive(Clone)]
pub struct DbCatalog {
    db: Arc<DatabaseConnection>,
}

impl DbCatalog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogLookup for DbCatalog {
    async fn get_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(Product::find_by_id(id).one(&*self.db).await?)
    }

    async fn get_products(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        let products = Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(&*self.db)
            .await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }
}
