use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::cart_line;

/// A line as the shopper sees it: product reference plus the price snapshot
/// taken when it was added.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

impl From<cart_line::Model> for CartLine {
    fn from(line: cart_line::Model) -> Self {
        Self {
            product_id: line.product_id,
            name: line.name,
            unit_price: line.unit_price,
            quantity: line.quantity.max(0) as u32,
        }
    }
}

/// Cart state. Totals are never stored; they are always computed from `lines`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub owner_ref: String,
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(owner_ref: impl Into<String>) -> Self {
        Self {
            owner_ref: owner_ref.into(),
            lines: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn total_price(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn line(&self, product_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Adds `quantity` units, merging into an existing line for the same product.
    /// The snapshot price of an existing line is left as is.
    pub fn add(&mut self, product_id: Uuid, name: &str, unit_price: Decimal, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity += quantity,
            None => self.lines.push(CartLine {
                product_id,
                name: name.to_string(),
                unit_price,
                quantity,
            }),
        }
    }

    /// Removes one unit; the line disappears when it reaches zero.
    pub fn decrement(&mut self, product_id: Uuid) {
        if let Some(pos) = self.lines.iter().position(|l| l.product_id == product_id) {
            if self.lines[pos].quantity <= 1 {
                self.lines.remove(pos);
            } else {
                self.lines[pos].quantity -= 1;
            }
        }
    }

    pub fn remove(&mut self, product_id: Uuid) {
        self.lines.retain(|l| l.product_id != product_id);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Merges a server validation report into locally held cart state.
    ///
    /// The server wins on availability, price and name. A quantity is never raised
    /// by the report, and lines the report never saw are kept for the next round.
    pub fn reconcile(&mut self, report: &ValidationReport) {
        let removed: HashSet<Uuid> = report.removed.iter().copied().collect();
        self.lines.retain(|l| !removed.contains(&l.product_id));

        for line in &mut self.lines {
            if let Some(server) = report.cart.line(line.product_id) {
                line.unit_price = server.unit_price;
                line.name = server.name.clone();
                line.quantity = line.quantity.min(server.quantity);
            }
        }
        self.lines.retain(|l| l.quantity > 0);
    }

    pub fn summary(&self) -> CartSummary {
        CartSummary::from(self)
    }
}

/// Wire view of a cart with derived totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub owner_ref: String,
    pub lines: Vec<CartLine>,
    pub total_quantity: u32,
    pub total_price: Decimal,
}

impl From<&Cart> for CartSummary {
    fn from(cart: &Cart) -> Self {
        Self {
            owner_ref: cart.owner_ref.clone(),
            lines: cart.lines.clone(),
            total_quantity: cart.total_quantity(),
            total_price: cart.total_price(),
        }
    }
}

/// Output of the cart validator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Corrected cart priced from the catalog.
    pub cart: Cart,
    pub warnings: Vec<String>,
    /// Product ids dropped from the cart.
    pub removed: Vec<Uuid>,
}

impl ValidationReport {
    pub fn has_changes(&self) -> bool {
        !self.warnings.is_empty()
    }
}
