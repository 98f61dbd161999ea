//! Formatting helpers for console output

use num_format::{Locale, ToFormattedString};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Fixed decimals with thousands separators, e.g. `1,234,567.89`
pub fn format_amount(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    let abs = rounded.abs();

    // Decimal's 96-bit mantissa always fits in u128
    let whole = abs.trunc().to_u128().unwrap_or_default();
    let grouped = whole.to_formatted_string(&Locale::en);

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let text = format!("{:.*}", dp as usize, abs);
    match text.split_once('.') {
        Some((_, frac)) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// Percentage with optional sign, or `n/a` when undefined
pub fn format_pct(value: Option<f64>, signed: bool) -> String {
    match value {
        Some(v) if signed => format!("{:+.2}%", v),
        Some(v) => format!("{:.2}%", v),
        None => "n/a".to_string(),
    }
}
