use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    address::ShippingAddress,
    order_status::{OrderStatus, PaymentStatus},
};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_ref: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Gateway id chosen at checkout.
    pub payment_method: String,
    /// Provider that confirmed payment, if any.
    pub settled_by: Option<String>,
    /// Provider-side intent/order id from the last initiation.
    pub payment_ref: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    pub currency: String,

    pub shipping_street: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_zip: String,
    pub shipping_country: String,
    pub shipping_phone: Option<String>,

    pub carrier_order_ref: Option<String>,
    pub shipment_ref: Option<String>,
    pub tracking_code: Option<String>,
    pub carrier_name: Option<String>,
    pub tracking_url: Option<String>,
    pub label_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_line::Entity")]
    Lines,
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn shipping_address(&self) -> ShippingAddress {
        ShippingAddress {
            street: self.shipping_street.clone(),
            city: self.shipping_city.clone(),
            state: self.shipping_state.clone(),
            zip: self.shipping_zip.clone(),
            country: self.shipping_country.clone(),
            phone: self.shipping_phone.clone(),
        }
    }

    pub fn is_booked(&self) -> bool {
        self.shipment_ref.is_some()
    }
}
