use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, SimpleExpr},
    ActiveEnum, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::TransactionSupport,
    entities::{order, order_line, Order, OrderLine},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{OrderStatus, PaymentStatus, Transition},
    payments::GatewayId,
};

/// Moves an order from `from` to `to` only if it is still in `from`.
///
/// Returns `false` when another writer changed the status first. `extra` sets
/// additional columns in the same statement.
pub(crate) async fn conditional_transition<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    extra: Vec<(order::Column, SimpleExpr)>,
) -> Result<bool, DbErr> {
    let mut update = Order::update_many()
        .col_expr(order::Column::Status, Expr::value(to.to_value()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()));
    for (column, value) in extra {
        update = update.col_expr(column, value);
    }
    let result = update
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(from.to_value()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// One page of orders plus the unpaged count.
#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub items: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// How a settlement request landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Applied,
    /// Payment was already in the requested state (e.g. a redelivered webhook).
    Duplicate,
    /// Payment had already reached a different final state.
    Conflict(PaymentStatus),
}

/// Order ledger reads and the status/payment state machine.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    tx_support: TransactionSupport,
}

impl OrderStatusService {
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

    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Same as [`get_order`](Self::get_order) but hides other owners' orders.
    pub async fn get_order_for_owner(
        &self,
        owner_ref: &str,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;
        if order.owner_ref != owner_ref {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        Ok(order)
    }

    /// A shopper's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_owner(&self, owner_ref: &str) -> Result<Vec<order::Model>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::OwnerRef.eq(owner_ref))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list orders for owner");
                ServiceError::from(e)
            })?;
        info!(returned_count = orders.len(), "Owner orders listed");
        Ok(orders)
    }

    /// Lists all orders with pagination, optionally narrowed to one status.
    /// `page` is 1-based.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        limit: u64,
    ) -> Result<OrderPage, ServiceError> {
        let page = page.max(1);
        let limit = limit.max(1);

        let mut query = Order::find();
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status.to_value()));
        }
        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::from(e)
        })?;
        let items = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch orders page");
            ServiceError::from(e)
        })?;

        info!(total, page, limit, returned_count = items.len(), "Orders listed");
        Ok(OrderPage {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    pub async fn get_lines(&self, order_id: Uuid) -> Result<Vec<order_line::Model>, ServiceError> {
        Ok(OrderLine::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .order_by_asc(order_line::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Administrator status change. Re-applying the current status is a no-op.
    ///
    /// Only `Processing` and `Cancelled` can be set here; shipping states are
    /// reached through the shipment workflow so booking and tracking data exist.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %next))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;
        let current = order.status;

        match current.check_transition(next) {
            Ok(Transition::Unchanged) => return Ok(order),
            Ok(Transition::Applied) => {}
            Err(e) => {
                warn!("Invalid status transition from {} to {}", current, next);
                return Err(e);
            }
        }
        if !next.is_manually_settable() {
            warn!("Refused manual status change from {} to {}", current, next);
            return Err(ServiceError::ValidationError(format!(
                "Status '{}' is set by the shipment workflow",
                next
            )));
        }

        if !conditional_transition(&*self.db, order_id, current, next, vec![]).await? {
            error!("Order {} changed while moving {} -> {}", order_id, current, next);
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        info!("Order {} status updated from '{}' to '{}'", order_id, current, next);
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current,
                new_status: next,
            })
            .await;

        self.get_order(order_id).await
    }

    /// Marks an order paid by `provider`. Safe to call any number of times.
    ///
    /// A pending order also moves to processing. Orders already moved on (for
    /// example cancelled by an admin) keep their status.
    #[instrument(skip(self), fields(order_id = %order_id, provider = %provider))]
    pub async fn settle_payment(
        &self,
        order_id: Uuid,
        provider: GatewayId,
    ) -> Result<SettlementOutcome, ServiceError> {
        let applied = if self.tx_support.is_transactional() {
            let txn = self.db.begin().await?;
            let applied = Self::apply_settlement(&txn, order_id, provider).await?;
            txn.commit().await?;
            applied
        } else {
            Self::apply_settlement(&*self.db, order_id, provider).await?
        };

        if !applied {
            return self.explain_noop(order_id, PaymentStatus::Paid).await;
        }

        info!("Payment settled for order {}", order_id);
        metrics::counter!("storefront_payments_settled_total", 1, "provider" => provider.to_string());
        self.event_sender
            .send_or_log(Event::PaymentSettled {
                order_id,
                provider: provider.to_string(),
            })
            .await;
        Ok(SettlementOutcome::Applied)
    }

    async fn apply_settlement<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        provider: GatewayId,
    ) -> Result<bool, ServiceError> {
        let paid = Order::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Paid.to_value()))
            .col_expr(order::Column::SettledBy, Expr::value(provider.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_value()))
            .exec(conn)
            .await?;
        if paid.rows_affected == 0 {
            return Ok(false);
        }

        // Zero rows here means the order already left pending; that is fine.
        conditional_transition(
            conn,
            order_id,
            OrderStatus::Pending,
            OrderStatus::Processing,
            vec![],
        )
        .await?;
        Ok(true)
    }

    /// Marks a pending payment failed. The order status is left alone so the
    /// shopper can be contacted.
    #[instrument(skip(self), fields(order_id = %order_id, provider = %provider))]
    pub async fn fail_payment(
        &self,
        order_id: Uuid,
        provider: GatewayId,
    ) -> Result<SettlementOutcome, ServiceError> {
        let result = Order::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Failed.to_value()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_value()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return self.explain_noop(order_id, PaymentStatus::Failed).await;
        }

        warn!("Payment failed for order {}", order_id);
        self.event_sender
            .send_or_log(Event::PaymentFailed {
                order_id,
                provider: provider.to_string(),
            })
            .await;
        Ok(SettlementOutcome::Applied)
    }

    /// Administrator confirmation that a manual payment (cash, UPI) was received.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn record_manual_payment(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;
        let gateway = order.payment_method.parse::<GatewayId>().ok();
        let Some(gateway) = gateway.filter(|g| g.is_manual()) else {
            return Err(ServiceError::ValidationError(format!(
                "Order {} was not placed with a manual payment method",
                order_id
            )));
        };

        if order.payment_status.check_transition(PaymentStatus::Paid)? == Transition::Unchanged {
            return Ok(order);
        }

        let result = Order::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Paid.to_value()))
            .col_expr(order::Column::SettledBy, Expr::value(gateway.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_value()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        info!("Manual payment recorded for order {}", order_id);
        self.event_sender
            .send_or_log(Event::PaymentSettled {
                order_id,
                provider: gateway.to_string(),
            })
            .await;
        self.get_order(order_id).await
    }

    /// Keeps the provider reference from the latest initiation.
    pub async fn set_payment_ref(&self, order_id: Uuid, payment_ref: &str) -> Result<(), ServiceError> {
        Order::update_many()
            .col_expr(order::Column::PaymentRef, Expr::value(payment_ref.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    async fn explain_noop(
        &self,
        order_id: Uuid,
        wanted: PaymentStatus,
    ) -> Result<SettlementOutcome, ServiceError> {
        let order = self.get_order(order_id).await?;
        if order.payment_status == wanted {
            info!("Payment for order {} already {}", order_id, wanted);
            Ok(SettlementOutcome::Duplicate)
        } else {
            warn!(
                "Payment for order {} is {}, ignoring request to mark {}",
                order_id, order.payment_status, wanted
            );
            Ok(SettlementOutcome::Conflict(order.payment_status))
        }
    }
}
