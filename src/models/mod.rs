pub mod address;
pub mod cart;
pub mod order_status;

pub use address::ShippingAddress;
pub use cart::{Cart, CartLine, CartSummary, ValidationReport};
pub use order_status::{OrderStatus, PaymentStatus, Transition};
