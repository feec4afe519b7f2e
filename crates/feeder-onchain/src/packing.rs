//! Oracle word packing.
//!
//! One 256-bit word carries the price at precision 8 in the high 128 bits
//! and the unix timestamp in the low 128 bits.

use crate::error::{OnchainError, OnchainResult};
use alloy::primitives::U256;

/// Price scale: 8 decimal digits.
const PRICE_SCALE: f64 = 1e8;

/// Pack `(round(value * 1e8) << 128) | timestamp`.
pub fn pack(value: f64, timestamp: i64) -> OnchainResult<U256> {
    if !value.is_finite() || value < 0.0 {
        return Err(OnchainError::ValueOutOfRange(value));
    }
    let scaled = (value * PRICE_SCALE).round();
    // u128::MAX as f64
    if scaled >= 340_282_366_920_938_463_463_374_607_431_768_211_455f64 {
        return Err(OnchainError::ValueOutOfRange(value));
    }
    if timestamp < 0 {
        return Err(OnchainError::TimestampOutOfRange(timestamp));
    }
    let word = (U256::from(scaled as u128) << 128) | U256::from(timestamp as u128);
    Ok(word)
}

/// Inverse of [`pack`], for diagnostics and tests.
pub fn unpack(word: U256) -> (f64, i64) {
    let mask = (U256::from(1u8) << 128) - U256::from(1u8);
    let masked: U256 = word & mask;
    let timestamp = masked.to::<u128>() as i64;
    let shifted: U256 = word >> 128;
    let scaled = shifted.to::<u128>();
    (scaled as f64 / PRICE_SCALE, timestamp)
}
