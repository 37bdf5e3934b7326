//! Courier integration: the carrier HTTP client and tracking vocabulary.

pub mod carrier;
pub mod tracking;

pub use carrier::{
    AwbAssignment, CarrierBooking, CarrierClient, CarrierError, CarrierOrderLine,
    CarrierOrderRequest, HttpCarrierClient,
};
pub use tracking::TrackingStatusMap;
