pub mod cart_service;
pub mod cart_validator;
pub mod checkout_service;

pub use cart_service::CartService;
pub use cart_validator::CartValidator;
pub use checkout_service::{CheckoutOutcome, CheckoutRequest, CheckoutService, PaymentStart};
