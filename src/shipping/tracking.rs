use std::collections::HashMap;

use crate::models::OrderStatus;

/// Built-in courier vocabulary. Anything else is ignored during sync.
const DEFAULT_ENTRIES: &[(&str, OrderStatus)] = &[
    ("SHIPPED", OrderStatus::Shipped),
    ("PICKED UP", OrderStatus::Shipped),
    ("IN TRANSIT", OrderStatus::Shipped),
    ("OUT FOR DELIVERY", OrderStatus::Shipped),
    ("REACHED AT DESTINATION HUB", OrderStatus::Shipped),
    ("DELIVERED", OrderStatus::Delivered),
    ("RETURN INITIATED", OrderStatus::ReturnToOrigin),
    ("RTO INITIATED", OrderStatus::ReturnToOrigin),
    ("RTO IN TRANSIT", OrderStatus::ReturnToOrigin),
    ("RTO DELIVERED", OrderStatus::ReturnToOrigin),
];

/// Maps free-text carrier statuses to order statuses.
#[derive(Debug, Clone)]
pub struct TrackingStatusMap {
    entries: HashMap<String, OrderStatus>,
}

impl Default for TrackingStatusMap {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES
                .iter()
                .map(|(text, status)| (normalize(text), *status))
                .collect(),
        }
    }
}

/// Upper-cases and folds `-`, `_` and repeated whitespace into single spaces.
fn normalize(raw: &str) -> String {
    raw.to_uppercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl TrackingStatusMap {
    /// Default table extended (or overridden) by configured pairs. Pairs naming a
    /// status outside shipped/delivered/return_to_origin are skipped.
    pub fn with_overrides(pairs: &[(String, String)]) -> Self {
        let mut map = Self::default();
        for (text, status) in pairs {
            match status.parse::<OrderStatus>() {
                Ok(status @ (OrderStatus::Shipped
                | OrderStatus::Delivered
                | OrderStatus::ReturnToOrigin)) => {
                    map.entries.insert(normalize(text), status);
                }
                _ => tracing::warn!(text = %text, status = %status, "ignoring tracking override"),
            }
        }
        map
    }

    pub fn map(&self, carrier_status: &str) -> Option<OrderStatus> {
        self.entries.get(&normalize(carrier_status)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_regardless_of_case_and_separators() {
        let map = TrackingStatusMap::default();
        assert_eq!(map.map("Delivered"), Some(OrderStatus::Delivered));
        assert_eq!(map.map("in-transit"), Some(OrderStatus::Shipped));
        assert_eq!(map.map("RTO_DELIVERED"), Some(OrderStatus::ReturnToOrigin));
        assert_eq!(map.map("  out   for delivery "), Some(OrderStatus::Shipped));
    }

    #[test]
    fn return_initiated_maps_to_return_to_origin() {
        let map = TrackingStatusMap::default();
        assert_eq!(map.map("return-initiated"), Some(OrderStatus::ReturnToOrigin));
        assert_eq!(map.map("Return Initiated"), Some(OrderStatus::ReturnToOrigin));
    }

    #[test]
    fn unknown_text_is_unmapped() {
        assert_eq!(TrackingStatusMap::default().map("LOST IN SPACE"), None);
    }

    #[test]
    fn overrides_extend_the_table() {
        let map = TrackingStatusMap::with_overrides(&[
            ("Handed to partner".to_string(), "shipped".to_string()),
            ("Misrouted".to_string(), "cancelled".to_string()),
        ]);
        assert_eq!(map.map("HANDED TO PARTNER"), Some(OrderStatus::Shipped));
        assert_eq!(map.map("misrouted"), None);
    }
}
