use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::TransactionSupport,
    entities::{order, order_line, Order, OrderLine, Product, product},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{OrderStatus, PaymentStatus, ShippingAddress},
    payments::GatewayId,
    services::commerce::cart_service::{clear_cart_rows, load_cart_rows},
};

/// Input to the cart-to-order conversion.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub owner_ref: String,
    pub shipping_address: ShippingAddress,
    /// Gateway id chosen by the shopper.
    pub payment_method: String,
    pub currency: String,
}

/// Writes applied so far, used to undo work when running without transactions.
#[derive(Debug, Default)]
struct AppliedWrites {
    decrements: Vec<(Uuid, i32)>,
    order_id: Option<Uuid>,
}

/// Atomically turns the owner's cart into an order and decrements stock.
#[derive(Clone)]
pub struct OrderCommitService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    tx_support: TransactionSupport,
}

impl OrderCommitService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        tx_support: TransactionSupport,
    ) -> Self {
        Self {
            db,
            event_sender,
            tx_support,
        }
    }

    pub fn transaction_support(&self) -> TransactionSupport {
        self.tx_support
    }

    /// Commits the cart as a new pending order.
    ///
    /// Every cart line is re-priced from the catalog inside the unit of work and
    /// its stock decremented with a guarded update, so two shoppers racing for the
    /// last unit cannot both succeed. Any failure leaves products, orders and the
    /// cart exactly as they were.
    ///
    /// # Errors
    ///
    /// * `IncompleteAddress` - a required address field is blank
    /// * `ValidationError` - unknown payment method
    /// * `EmptyCart` - nothing to order
    /// * `ItemUnavailable` - a product is gone, inactive or short on stock
    #[instrument(skip(self, request), fields(owner = %request.owner_ref, gateway = %request.payment_method))]
    pub async fn commit_order(&self, request: CommitRequest) -> Result<order::Model, ServiceError> {
        request.shipping_address.ensure_complete()?;
        let gateway = request.payment_method.trim().parse::<GatewayId>().map_err(|_| {
            ServiceError::ValidationError(format!(
                "Unknown payment method '{}'",
                request.payment_method
            ))
        })?;

        let mut applied = AppliedWrites::default();
        let order = if self.tx_support.is_transactional() {
            let txn = self.db.begin().await?;
            match Self::apply(&txn, &request, gateway, &mut applied).await {
                Ok(order) => {
                    txn.commit().await?;
                    order
                }
                Err(e) => {
                    if let Err(rollback_err) = txn.rollback().await {
                        error!("Rollback after failed commit also failed: {}", rollback_err);
                    }
                    return Err(e);
                }
            }
        } else {
            warn!("Committing order without a database transaction (degraded mode)");
            match Self::apply(&*self.db, &request, gateway, &mut applied).await {
                Ok(order) => order,
                Err(e) => {
                    self.compensate(&applied).await;
                    return Err(e);
                }
            }
        };

        info!(order_id = %order.id, total = %order.total_amount, "order committed");
        metrics::counter!("storefront_orders_committed_total", 1, "gateway" => gateway.to_string());
        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: order.id,
                owner_ref: order.owner_ref.clone(),
                total_amount: order.total_amount,
                payment_method: order.payment_method.clone(),
            })
            .await;

        Ok(order)
    }

    async fn apply<C: ConnectionTrait>(
        conn: &C,
        request: &CommitRequest,
        gateway: GatewayId,
        applied: &mut AppliedWrites,
    ) -> Result<order::Model, ServiceError> {
        let (cart, lines) = match load_cart_rows(conn, &request.owner_ref).await? {
            Some((cart, lines)) if !lines.is_empty() => (cart, lines),
            _ => return Err(ServiceError::EmptyCart),
        };

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let mut total = Decimal::ZERO;
        let mut order_lines = Vec::with_capacity(lines.len());

        for line in &lines {
            let product = Product::find_by_id(line.product_id)
                .one(conn)
                .await?
                .filter(|p| p.in_stock())
                .ok_or_else(|| ServiceError::ItemUnavailable(line.name.clone()))?;

            let decremented = Product::update_many()
                .col_expr(
                    product::Column::StockQuantity,
                    Expr::col(product::Column::StockQuantity).sub(line.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(product.id))
                .filter(product::Column::IsActive.eq(true))
                .filter(product::Column::StockQuantity.gte(line.quantity))
                .exec(conn)
                .await?;
            if decremented.rows_affected == 0 {
                warn!(product_id = %product.id, requested = line.quantity, "insufficient stock at commit");
                return Err(ServiceError::ItemUnavailable(product.name));
            }
            applied.decrements.push((product.id, line.quantity));

            total += product.unit_price * Decimal::from(line.quantity);
            order_lines.push(order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                name: Set(product.name.clone()),
                unit_price: Set(product.unit_price),
                quantity: Set(line.quantity),
            });
        }

        let address = request.shipping_address.trimmed();
        let order = order::ActiveModel {
            id: Set(order_id),
            owner_ref: Set(request.owner_ref.clone()),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(gateway.to_string()),
            settled_by: Set(None),
            payment_ref: Set(None),
            total_amount: Set(total),
            currency: Set(request.currency.to_uppercase()),
            shipping_street: Set(address.street),
            shipping_city: Set(address.city),
            shipping_state: Set(address.state),
            shipping_zip: Set(address.zip),
            shipping_country: Set(address.country),
            shipping_phone: Set(address.phone),
            carrier_order_ref: Set(None),
            shipment_ref: Set(None),
            tracking_code: Set(None),
            carrier_name: Set(None),
            tracking_url: Set(None),
            label_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        applied.order_id = Some(order_id);

        OrderLine::insert_many(order_lines).exec(conn).await?;
        clear_cart_rows(conn, cart.id).await?;

        Ok(order)
    }

    /// Best-effort undo of a partially applied non-transactional commit.
    async fn compensate(&self, applied: &AppliedWrites) {
        let db = &*self.db;
        if let Some(order_id) = applied.order_id {
            let lines = OrderLine::delete_many()
                .filter(order_line::Column::OrderId.eq(order_id))
                .exec(db)
                .await;
            let order = Order::delete_by_id(order_id).exec(db).await;
            if let Err(e) = lines.and(order) {
                error!(order_id = %order_id, "failed to remove partial order: {}", e);
            }
        }

        for (product_id, quantity) in &applied.decrements {
            let restock = Product::update_many()
                .col_expr(
                    product::Column::StockQuantity,
                    Expr::col(product::Column::StockQuantity).add(*quantity),
                )
                .filter(product::Column::Id.eq(*product_id))
                .exec(db)
                .await;
            match restock {
                Ok(_) => info!(product_id = %product_id, quantity, "restocked after failed commit"),
                Err(e) => error!(
                    product_id = %product_id,
                    quantity,
                    "restock after failed commit failed; manual correction needed: {}",
                    e
                ),
            }
        }
    }
}
