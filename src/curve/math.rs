//! Exact integer arithmetic for withdrawal sizing and unit conversion

use crate::error::{PegError, Result};
use ethers::types::U256;
use rust_decimal::Decimal;

pub const BPS_DENOMINATOR: u32 = 10_000;

/// Raw token amount in smallest units → human units
pub fn to_units(raw: U256, decimals: u8) -> Result<Decimal> {
    if raw.bits() > 127 {
        return Err(PegError::InvalidData(format!("amount {} too large", raw)));
    }
    let value = raw.as_u128() as i128;
    Decimal::try_from_i128_with_scale(value, decimals as u32)
        .map_err(|e| PegError::InvalidData(format!("amount {} with {} decimals: {}", raw, decimals, e)))
}

/// `floor(balance * fraction)` for a fraction in (0, 1]
pub fn burn_amount(balance: U256, fraction: Decimal) -> Result<U256> {
    if fraction <= Decimal::ZERO || fraction > Decimal::ONE {
        return Err(PegError::Config(format!(
            "fraction of balance must be in (0, 1], got {}",
            fraction
        )));
    }
    let mantissa = U256::from(fraction.mantissa() as u128);
    let scale = U256::exp10(fraction.scale() as usize);
    balance
        .checked_mul(mantissa)
        .map(|v| v / scale)
        .ok_or_else(|| PegError::InvalidData(format!("balance {} overflows", balance)))
}

/// Minimum accepted output: `floor(expected * (10000 - slippage_bps) / 10000)`
pub fn min_amount_out(expected: U256, slippage_bps: u32) -> Result<U256> {
    if slippage_bps > BPS_DENOMINATOR {
        return Err(PegError::Config(format!(
            "slippage must be at most {} bps, got {}",
            BPS_DENOMINATOR, slippage_bps
        )));
    }
    let keep = U256::from(BPS_DENOMINATOR - slippage_bps);
    expected
        .checked_mul(keep)
        .map(|v| v / U256::from(BPS_DENOMINATOR))
        .ok_or_else(|| PegError::InvalidData(format!("expected amount {} overflows", expected)))
}
