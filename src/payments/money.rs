use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::ServiceError;

/// ISO 4217 currencies without a minor unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

pub fn minor_unit_exponent(currency: &str) -> u32 {
    if ZERO_DECIMAL_CURRENCIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(currency))
    {
        0
    } else {
        2
    }
}

/// Converts a stored amount to provider minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64, ServiceError> {
    let scale = Decimal::from(10_i64.pow(minor_unit_exponent(currency)));
    (amount * scale)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("Amount {} cannot be charged", amount))
        })
}
