use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::{
    errors::ServiceError,
    models::{Cart, ValidationReport},
    services::catalog::CatalogLookup,
};

/// Reconciles a cart against the catalog without touching the cart store.
#[derive(Clone)]
pub struct CartValidator {
    catalog: Arc<dyn CatalogLookup>,
}

/// `10` for whole amounts, `12.50` otherwise.
fn format_price(amount: Decimal) -> String {
    let normalized = amount.normalize();
    if normalized.scale() == 0 {
        normalized.to_string()
    } else {
        format!("{:.2}", normalized)
    }
}

impl CartValidator {
    pub fn new(catalog: Arc<dyn CatalogLookup>) -> Self {
        Self { catalog }
    }

    /// Produces the corrected cart plus shopper-facing warnings.
    ///
    /// Lines for missing, inactive or out-of-stock products are dropped. Kept lines
    /// take the catalog price and name, and quantities above available stock are
    /// clamped. Totals of the returned cart are derived from the kept lines.
    #[instrument(skip(self, cart), fields(owner = %cart.owner_ref, lines = cart.lines.len()))]
    pub async fn validate(&self, cart: &Cart) -> Result<ValidationReport, ServiceError> {
        let mut report = ValidationReport {
            cart: Cart::new(cart.owner_ref.clone()),
            ..Default::default()
        };
        if cart.is_empty() {
            return Ok(report);
        }

        let ids: Vec<_> = cart.lines.iter().map(|l| l.product_id).collect();
        let products = self.catalog.get_products(&ids).await?;

        for line in &cart.lines {
            let product = match products.get(&line.product_id) {
                Some(p) if p.is_active => p,
                _ => {
                    report
                        .warnings
                        .push(format!("{} is no longer available", line.name));
                    report.removed.push(line.product_id);
                    continue;
                }
            };

            if !product.in_stock() {
                report
                    .warnings
                    .push(format!("{} is out of stock", product.name));
                report.removed.push(line.product_id);
                continue;
            }

            if product.unit_price != line.unit_price {
                report.warnings.push(format!(
                    "Price for {} updated from ${} to ${}",
                    product.name,
                    format_price(line.unit_price),
                    format_price(product.unit_price)
                ));
            }

            let available = product.stock_quantity.max(0) as u32;
            let quantity = if line.quantity > available {
                report.warnings.push(format!(
                    "Quantity for {} reduced from {} to {}",
                    product.name, line.quantity, available
                ));
                available
            } else {
                line.quantity
            };

            report
                .cart
                .add(product.id, &product.name, product.unit_price, quantity);
        }

        debug!(
            warnings = report.warnings.len(),
            removed = report.removed.len(),
            "cart validated"
        );
        Ok(report)
    }
}
