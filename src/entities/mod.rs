pub mod cart;
pub mod cart_line;
pub mod gateway_config;
pub mod order;
pub mod order_line;
pub mod product;

pub use cart::Entity as Cart;
pub use cart_line::Entity as CartLine;
pub use gateway_config::Entity as GatewayConfig;
pub use order::Entity as Order;
pub use order_line::Entity as OrderLine;
pub use product::Entity as Product;
