//! Decimal normalisation of backend numbers into grid-ready cell values.
//!
//! Everything is computed in exact decimal arithmetic; conversion to `f64` only happens when a
//! value becomes a [`CellValue::Number`].

use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use sara_model::CellValue;

/// Fractional digits for grades.
pub const GRADE_PLACES: u32 = 2;
/// Fractional digits for exercise weights and report numeric grades.
pub const WEIGHT_PLACES: u32 = 4;
/// Fractional digits for percent fractions and allocator shares.
pub const FRACTION_PLACES: u32 = 6;

/// Round to `places` fractional digits, midpoints away from zero.
pub fn round_half_up(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a backend numeric string.
///
/// Accepts surrounding whitespace, a trailing `%` (the number itself is kept, not divided), a
/// decimal comma and scientific notation. Returns `None` for anything else.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.replace(',', ".");
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// Convert a percent (0 to 100) into a fraction of 1. Absent input counts as 0.
pub fn percent_fraction(percent: Option<Decimal>) -> Decimal {
    round_half_up(percent.unwrap_or_default() / Decimal::ONE_HUNDRED, FRACTION_PLACES)
}

/// Round a value that may be absent; absent stays absent so the caller can skip the cell.
pub fn optional_number(value: Option<Decimal>, places: u32) -> Option<Decimal> {
    value.map(|v| round_half_up(v, places))
}

/// Round a value whose absence means 0.
pub fn number_or_zero(value: Option<Decimal>, places: u32) -> Decimal {
    round_half_up(value.unwrap_or_default(), places)
}

pub fn to_cell(value: Decimal) -> CellValue {
    CellValue::Number(value.to_f64().unwrap_or_default())
}

/// Read a template cell as a decimal: numbers as is, numeric strings parsed, everything else 0.
pub fn cell_decimal(value: &CellValue) -> Decimal {
    match value {
        CellValue::Number(n) => Decimal::from_f64(*n).unwrap_or_default(),
        CellValue::String(s) => parse_decimal(s).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// Student codes made only of digits are written as numbers (the template's lookups compare them
/// numerically); anything else stays text.
pub fn student_code_value(code: &str) -> CellValue {
    let code = code.trim();
    if code.is_empty() {
        return CellValue::Empty;
    }
    if code.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = code.parse::<f64>() {
            return CellValue::Number(n);
        }
    }
    CellValue::String(code.to_string())
}
