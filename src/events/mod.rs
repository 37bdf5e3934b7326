use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Events are notifications; a lost one never rolls back committed state.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events emitted after state has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        owner_ref: String,
        total_amount: Decimal,
        payment_method: String,
    },
    PaymentSettled {
        order_id: Uuid,
        provider: String,
    },
    PaymentFailed {
        order_id: Uuid,
        provider: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    ShipmentBooked {
        order_id: Uuid,
        shipment_ref: String,
    },
    ShipmentCancelled(Uuid),
}

impl Event {
    pub fn order_id(&self) -> Uuid {
        match self {
            Event::OrderPlaced { order_id, .. }
            | Event::PaymentSettled { order_id, .. }
            | Event::PaymentFailed { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::ShipmentBooked { order_id, .. } => *order_id,
            Event::ShipmentCancelled(order_id) => *order_id,
        }
    }
}

/// Drains the event channel. Customer messaging hooks in here.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                total_amount,
                payment_method,
                ..
            } => info!(
                order_id = %order_id,
                total = %total_amount,
                gateway = %payment_method,
                "order placed"
            ),
            Event::PaymentSettled { order_id, provider } => {
                info!(order_id = %order_id, provider = %provider, "payment settled")
            }
            Event::PaymentFailed { order_id, provider } => {
                warn!(order_id = %order_id, provider = %provider, "payment failed")
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(
                order_id = %order_id,
                from = %old_status,
                to = %new_status,
                "order status changed"
            ),
            Event::ShipmentBooked {
                order_id,
                shipment_ref,
            } => info!(order_id = %order_id, shipment_ref = %shipment_ref, "shipment booked"),
            Event::ShipmentCancelled(order_id) => {
                info!(order_id = %order_id, "shipment cancelled")
            }
        }
    }

    info!("Event processing loop finished");
}
