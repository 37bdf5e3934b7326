use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Fulfilment lifecycle of an order.
///
/// ```text
/// Pending -> Processing -> ReadyToShip -> Shipped -> Delivered
///                                            \-> ReturnToOrigin
/// any non-terminal state -> Cancelled
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "ready_to_ship")]
    ReadyToShip,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "return_to_origin")]
    ReturnToOrigin,
}

/// Settlement state, orthogonal to [`OrderStatus`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Result of checking a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The edge is legal and a write is needed.
    Applied,
    /// The order is already in the requested state.
    Unchanged,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Cancelled | Self::ReturnToOrigin
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Processing)
            | (Processing, ReadyToShip)
            | (ReadyToShip, Shipped)
            | (Shipped, Delivered)
            | (Shipped, ReturnToOrigin) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Targets an operator may set by hand. Booking, AWB issuance and tracking
    /// sync own every other edge.
    pub fn is_manually_settable(self) -> bool {
        matches!(self, Self::Processing | Self::Cancelled)
    }

    /// Same state is a no-op; any other illegal edge is an error.
    pub fn check_transition(self, next: OrderStatus) -> Result<Transition, ServiceError> {
        if self == next {
            Ok(Transition::Unchanged)
        } else if self.can_transition_to(next) {
            Ok(Transition::Applied)
        } else {
            Err(ServiceError::invalid_transition(self, next))
        }
    }
}

impl PaymentStatus {
    pub fn check_transition(self, next: PaymentStatus) -> Result<Transition, ServiceError> {
        match (self, next) {
            (from, to) if from == to => Ok(Transition::Unchanged),
            (PaymentStatus::Pending, PaymentStatus::Paid | PaymentStatus::Failed) => {
                Ok(Transition::Applied)
            }
            (from, to) => Err(ServiceError::invalid_transition(from, to)),
        }
    }
}
