use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{cart, cart_line, product, Cart as CartEntity, CartLine as CartLineEntity, Product},
    errors::ServiceError,
    models::Cart,
};

/// Persistent per-owner cart store.
///
/// Every mutation returns the cart as stored afterwards, with totals derived from
/// its lines. Carts are created on the first add and only ever cleared, never
/// deleted.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

/// Loads the stored cart row and its lines on any connection, including an open
/// transaction.
pub(crate) async fn load_cart_rows<C: ConnectionTrait>(
    conn: &C,
    owner_ref: &str,
) -> Result<Option<(cart::Model, Vec<cart_line::Model>)>, ServiceError> {
    let Some(cart) = CartEntity::find()
        .filter(cart::Column::OwnerRef.eq(owner_ref))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let lines = CartLineEntity::find()
        .filter(cart_line::Column::CartId.eq(cart.id))
        .order_by_asc(cart_line::Column::AddedAt)
        .all(conn)
        .await?;

    Ok(Some((cart, lines)))
}

/// Removes every line and touches the cart row.
pub(crate) async fn clear_cart_rows<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<(), ServiceError> {
    CartLineEntity::delete_many()
        .filter(cart_line::Column::CartId.eq(cart_id))
        .exec(conn)
        .await?;
    CartEntity::update_many()
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(conn)
        .await?;
    Ok(())
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Current cart; an owner without a stored cart gets an empty one.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, owner_ref: &str) -> Result<Cart, ServiceError> {
        let mut cart = Cart::new(owner_ref);
        if let Some((_, lines)) = load_cart_rows(&*self.db, owner_ref).await? {
            cart.lines = lines.into_iter().map(Into::into).collect();
        }
        Ok(cart)
    }

    /// Adds `quantity` units of a product, snapshotting its current price for a
    /// new line.
    ///
    /// # Errors
    ///
    /// * `ValidationError` - quantity below 1
    /// * `NotFound` - unknown product
    /// * `ItemUnavailable` - product inactive or out of stock
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner_ref: &str,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Cart, ServiceError> {
        if quantity == 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        if !product.in_stock() {
            return Err(ServiceError::ItemUnavailable(product.name));
        }

        let cart = self.get_or_create_cart(owner_ref).await?;
        self.upsert_line(&cart, &product, quantity).await?;

        info!(product_id = %product_id, quantity, "item added to cart");
        self.get_cart(owner_ref).await
    }

    /// Removes one unit; the line is deleted when it reaches zero.
    #[instrument(skip(self))]
    pub async fn decrement_item(
        &self,
        owner_ref: &str,
        product_id: Uuid,
    ) -> Result<Cart, ServiceError> {
        if let Some(line) = self.find_line(owner_ref, product_id).await? {
            if line.quantity <= 1 {
                CartLineEntity::delete_by_id(line.id).exec(&*self.db).await?;
            } else {
                let quantity = line.quantity - 1;
                let mut active: cart_line::ActiveModel = line.into();
                active.quantity = Set(quantity);
                active.update(&*self.db).await?;
            }
        }
        self.get_cart(owner_ref).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner_ref: &str,
        product_id: Uuid,
    ) -> Result<Cart, ServiceError> {
        if let Some(line) = self.find_line(owner_ref, product_id).await? {
            CartLineEntity::delete_by_id(line.id).exec(&*self.db).await?;
        }
        self.get_cart(owner_ref).await
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, owner_ref: &str) -> Result<Cart, ServiceError> {
        if let Some((cart, _)) = load_cart_rows(&*self.db, owner_ref).await? {
            clear_cart_rows(&*self.db, cart.id).await?;
        }
        Ok(Cart::new(owner_ref))
    }

    /// Overwrites the stored lines with `corrected`, typically a validation result
    /// the shopper accepted.
    #[instrument(skip(self, corrected), fields(lines = corrected.lines.len()))]
    pub async fn replace_lines(&self, owner_ref: &str, corrected: &Cart) -> Result<Cart, ServiceError> {
        let cart = self.get_or_create_cart(owner_ref).await?;

        let txn = self.db.begin().await?;
        clear_cart_rows(&txn, cart.id).await?;
        let now = Utc::now();
        for line in corrected.lines.iter().filter(|l| l.quantity > 0) {
            cart_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(line.product_id),
                name: Set(line.name.clone()),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity as i32),
                added_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        self.get_cart(owner_ref).await
    }

    async fn find_line(
        &self,
        owner_ref: &str,
        product_id: Uuid,
    ) -> Result<Option<cart_line::Model>, ServiceError> {
        Ok(load_cart_rows(&*self.db, owner_ref)
            .await?
            .and_then(|(_, lines)| lines.into_iter().find(|l| l.product_id == product_id)))
    }

    async fn get_or_create_cart(&self, owner_ref: &str) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = CartEntity::find()
            .filter(cart::Column::OwnerRef.eq(owner_ref))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let created = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_ref: Set(owner_ref.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await;

        match created {
            Ok(cart) => Ok(cart),
            Err(e) => {
                // Lost a creation race on the unique owner_ref.
                warn!("cart creation failed, re-reading: {}", e);
                CartEntity::find()
                    .filter(cart::Column::OwnerRef.eq(owner_ref))
                    .one(&*self.db)
                    .await?
                    .ok_or(ServiceError::DatabaseError(e))
            }
        }
    }

    async fn upsert_line(
        &self,
        cart: &cart::Model,
        product: &product::Model,
        quantity: u32,
    ) -> Result<(), ServiceError> {
        let existing = CartLineEntity::find()
            .filter(cart_line::Column::CartId.eq(cart.id))
            .filter(cart_line::Column::ProductId.eq(product.id))
            .one(&*self.db)
            .await?;

        match existing {
            Some(line) => {
                CartLineEntity::update_many()
                    .col_expr(
                        cart_line::Column::Quantity,
                        Expr::col(cart_line::Column::Quantity).add(quantity as i32),
                    )
                    .filter(cart_line::Column::Id.eq(line.id))
                    .exec(&*self.db)
                    .await?;
            }
            None => {
                cart_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    name: Set(product.name.clone()),
                    unit_price: Set(product.unit_price),
                    quantity: Set(quantity as i32),
                    added_at: Set(Utc::now()),
                }
                .insert(&*self.db)
                .await?;
            }
        }
        Ok(())
    }
}
