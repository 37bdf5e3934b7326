pub mod catalog;
pub mod commerce;
pub mod gateway_settings;
pub mod order_commit;
pub mod order_status;
pub mod shipments;
