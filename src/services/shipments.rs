use std::sync::Arc;

use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{order, Order},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{OrderStatus, PaymentStatus, Transition},
    payments::GatewayId,
    services::order_status::{conditional_transition, OrderStatusService},
    shipping::{AwbAssignment, CarrierClient, CarrierOrderLine, CarrierOrderRequest, TrackingStatusMap},
};

/// Result of a shipment operation, with a message for the operator.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentOutcome {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_url: Option<String>,
}

impl ShipmentOutcome {
    fn new(order: &order::Model, message: impl Into<String>) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            message: message.into(),
            tracking_code: order.tracking_code.clone(),
            label_url: order.label_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub order_id: Uuid,
    pub carrier_status: String,
    pub status: OrderStatus,
    pub changed: bool,
}

/// Courier booking, AWB and label issuance, cancellation and tracking sync.
#[derive(Clone)]
pub struct ShipmentService {
    db: Arc<DatabaseConnection>,
    orders: Arc<OrderStatusService>,
    carrier: Arc<dyn CarrierClient>,
    tracking_map: TrackingStatusMap,
    event_sender: Arc<EventSender>,
}

impl ShipmentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: Arc<OrderStatusService>,
        carrier: Arc<dyn CarrierClient>,
        tracking_map: TrackingStatusMap,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            orders,
            carrier,
            tracking_map,
            event_sender,
        }
    }

    /// Books a courier for a processing order and then tries to issue the AWB.
    ///
    /// Booking failure leaves the order untouched. AWB failure after a successful
    /// booking leaves it `ReadyToShip`; label issuance retries the AWB later.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn book_shipment(&self, order_id: Uuid) -> Result<ShipmentOutcome, ServiceError> {
        let order = self.orders.get_order(order_id).await?;
        if order.is_booked() {
            return Ok(ShipmentOutcome::new(&order, "Shipment already booked"));
        }
        if order.status != OrderStatus::Processing {
            return Err(ServiceError::invalid_transition(
                order.status,
                OrderStatus::ReadyToShip,
            ));
        }
        order.shipping_address().ensure_complete()?;

        let request = self.carrier_request(&order).await?;
        let booking = self.carrier.create_order(&request).await.map_err(|e| {
            error!("courier booking failed: {}", e);
            metrics::counter!("storefront_carrier_failures_total", 1, "operation" => "book");
            ServiceError::from(e)
        })?;

        let moved = conditional_transition(
            &*self.db,
            order_id,
            OrderStatus::Processing,
            OrderStatus::ReadyToShip,
            vec![
                (
                    order::Column::CarrierOrderRef,
                    Expr::value(booking.carrier_order_ref.clone()),
                ),
                (
                    order::Column::ShipmentRef,
                    Expr::value(booking.shipment_ref.clone()),
                ),
            ],
        )
        .await?;
        if !moved {
            warn!(
                shipment_ref = %booking.shipment_ref,
                "order changed during booking; courier booking left orphaned"
            );
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        info!(shipment_ref = %booking.shipment_ref, "shipment booked");
        self.event_sender
            .send_or_log(Event::ShipmentBooked {
                order_id,
                shipment_ref: booking.shipment_ref.clone(),
            })
            .await;
        self.status_changed(order_id, OrderStatus::Processing, OrderStatus::ReadyToShip)
            .await;

        let message = match self.issue_awb(order_id, &booking.shipment_ref).await {
            Ok(awb) => format!("Shipment booked with {} ({})", awb.carrier_name, awb.tracking_code),
            Err(e) => {
                warn!("AWB assignment failed after booking: {}", e);
                "Shipment booked, but AWB assignment failed. Generate the label to retry.".to_string()
            }
        };

        let order = self.orders.get_order(order_id).await?;
        Ok(ShipmentOutcome::new(&order, message))
    }

    /// Returns the shipping label URL, issuing the AWB first if needed.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn issue_tracking_label(&self, order_id: Uuid) -> Result<ShipmentOutcome, ServiceError> {
        let order = self.orders.get_order(order_id).await?;
        let Some(shipment_ref) = order.shipment_ref.clone() else {
            return Err(ServiceError::ValidationError(format!(
                "Order {} has no shipment booking",
                order_id
            )));
        };
        if order.label_url.is_some() {
            return Ok(ShipmentOutcome::new(&order, "Label already generated"));
        }
        if !matches!(order.status, OrderStatus::ReadyToShip | OrderStatus::Shipped) {
            return Err(ServiceError::invalid_transition(
                order.status,
                OrderStatus::Shipped,
            ));
        }

        if order.tracking_code.is_none() {
            self.issue_awb(order_id, &shipment_ref).await?;
        }

        let label_url = self.carrier.generate_label(&shipment_ref).await.map_err(|e| {
            error!("label generation failed: {}", e);
            metrics::counter!("storefront_carrier_failures_total", 1, "operation" => "label");
            ServiceError::from(e)
        })?;

        Order::update_many()
            .col_expr(order::Column::LabelUrl, Expr::value(label_url))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;

        let order = self.orders.get_order(order_id).await?;
        Ok(ShipmentOutcome::new(&order, "Label generated"))
    }

    /// Cancels the order, asking the courier to cancel first when a booking exists:
    /// by AWB once one is assigned, otherwise by the courier order reference.
    ///
    /// A courier failure is logged and the local cancellation still happens.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_shipment(&self, order_id: Uuid) -> Result<ShipmentOutcome, ServiceError> {
        let order = self.orders.get_order(order_id).await?;
        if order.status.check_transition(OrderStatus::Cancelled)? == Transition::Unchanged {
            return Ok(ShipmentOutcome::new(&order, "Order already cancelled"));
        }

        let mut message = "Order cancelled".to_string();
        let courier_cancel = match (&order.tracking_code, &order.carrier_order_ref) {
            (Some(awb), _) => Some(self.carrier.cancel(awb).await),
            (None, Some(carrier_ref)) => Some(self.carrier.cancel_booking(carrier_ref).await),
            (None, None) => None,
        };
        if let Some(Err(e)) = courier_cancel {
            warn!(
                awb = ?order.tracking_code,
                carrier_order_ref = ?order.carrier_order_ref,
                "courier cancellation failed, cancelling locally: {}",
                e
            );
            metrics::counter!("storefront_carrier_failures_total", 1, "operation" => "cancel");
            message = "Order cancelled; courier cancellation failed and needs follow-up".to_string();
        }

        let moved =
            conditional_transition(&*self.db, order_id, order.status, OrderStatus::Cancelled, vec![])
                .await?;
        if !moved {
            let latest = self.orders.get_order(order_id).await?;
            if latest.status == OrderStatus::Cancelled {
                return Ok(ShipmentOutcome::new(&latest, "Order already cancelled"));
            }
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        info!("order cancelled");
        self.event_sender
            .send_or_log(Event::ShipmentCancelled(order_id))
            .await;
        self.status_changed(order_id, order.status, OrderStatus::Cancelled)
            .await;

        let order = self.orders.get_order(order_id).await?;
        Ok(ShipmentOutcome::new(&order, message))
    }

    /// Pulls the courier status and applies it when it maps to a legal edge.
    /// Unknown carrier text and illegal edges leave the order as is.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn sync_tracking_status(&self, order_id: Uuid) -> Result<SyncOutcome, ServiceError> {
        let order = self.orders.get_order(order_id).await?;
        let Some(awb) = order.tracking_code.clone() else {
            return Err(ServiceError::ValidationError(format!(
                "Order {} has no tracking code",
                order_id
            )));
        };

        let carrier_status = self.carrier.track(&awb).await.map_err(|e| {
            error!("tracking lookup failed: {}", e);
            metrics::counter!("storefront_carrier_failures_total", 1, "operation" => "track");
            ServiceError::from(e)
        })?;

        let unchanged = |status| SyncOutcome {
            order_id,
            carrier_status: carrier_status.clone(),
            status,
            changed: false,
        };

        let Some(next) = self.tracking_map.map(&carrier_status) else {
            info!(carrier_status = %carrier_status, "carrier status not mapped");
            return Ok(unchanged(order.status));
        };
        if !order.status.can_transition_to(next) {
            info!(from = %order.status, to = %next, "tracking update ignored");
            return Ok(unchanged(order.status));
        }

        if !conditional_transition(&*self.db, order_id, order.status, next, vec![]).await? {
            let latest = self.orders.get_order(order_id).await?;
            return Ok(unchanged(latest.status));
        }

        info!(from = %order.status, to = %next, "tracking status applied");
        self.status_changed(order_id, order.status, next).await;
        Ok(SyncOutcome {
            order_id,
            carrier_status,
            status: next,
            changed: true,
        })
    }

    /// Assigns the AWB and moves `ReadyToShip` to `Shipped`.
    async fn issue_awb(&self, order_id: Uuid, shipment_ref: &str) -> Result<AwbAssignment, ServiceError> {
        let awb = self.carrier.assign_awb(shipment_ref).await.map_err(|e| {
            metrics::counter!("storefront_carrier_failures_total", 1, "operation" => "awb");
            ServiceError::from(e)
        })?;

        let moved = conditional_transition(
            &*self.db,
            order_id,
            OrderStatus::ReadyToShip,
            OrderStatus::Shipped,
            vec![
                (order::Column::TrackingCode, Expr::value(awb.tracking_code.clone())),
                (order::Column::CarrierName, Expr::value(awb.carrier_name.clone())),
                (order::Column::TrackingUrl, Expr::value(awb.tracking_url.clone())),
            ],
        )
        .await?;
        if !moved {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        info!(awb = %awb.tracking_code, "AWB assigned");
        self.status_changed(order_id, OrderStatus::ReadyToShip, OrderStatus::Shipped)
            .await;
        Ok(awb)
    }

    async fn carrier_request(&self, order: &order::Model) -> Result<CarrierOrderRequest, ServiceError> {
        let lines = self.orders.get_lines(order.id).await?;
        let address = order.shipping_address();
        let cash_on_delivery = order.payment_method == GatewayId::Cod.to_string()
            && order.payment_status != PaymentStatus::Paid;

        Ok(CarrierOrderRequest {
            order_id: order.id.to_string(),
            order_date: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
            customer_name: order.owner_ref.clone(),
            street: address.street,
            city: address.city,
            state: address.state,
            zip: address.zip,
            country: address.country,
            phone: address.phone,
            lines: lines
                .iter()
                .map(|line| CarrierOrderLine {
                    name: line.name.clone(),
                    sku: line.product_id.to_string(),
                    units: line.quantity,
                    selling_price: line.unit_price,
                })
                .collect(),
            cash_on_delivery,
            sub_total: order.total_amount,
        })
    }

    async fn status_changed(&self, order_id: Uuid, old_status: OrderStatus, new_status: OrderStatus) {
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;
    }
}
