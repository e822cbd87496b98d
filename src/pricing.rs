//! Document price allocation.
//!
//! A document is priced in USD as a whole; retrieval bills per chunk. The
//! allocator converts the USD price into integer asset base units and splits
//! it across chunks proportionally to their length in characters. Each chunk
//! price is floored; the remainder of up to N−1 base units is not
//! redistributed, so the per-chunk prices sum to at most the document total.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("price is not a finite non-negative number: {0}")]
    InvalidPrice(f64),
    #[error("price overflows asset base units: {0}")]
    Overflow(f64),
}

/// Converts a USD price to integer base units: `floor(price_usd × 10^decimals)`.
///
/// Goes through [`Decimal`] rather than raw f64 multiplication so that a price
/// like `0.006` at 6 decimals lands on exactly `6000` base units.
pub fn usd_to_base_units(price_usd: f64, asset_decimals: u32) -> Result<u64, PriceError> {
    if !price_usd.is_finite() || price_usd < 0.0 {
        return Err(PriceError::InvalidPrice(price_usd));
    }
    let price = Decimal::from_f64(price_usd).ok_or(PriceError::InvalidPrice(price_usd))?;
    let scale = Decimal::from(10u64.pow(asset_decimals));
    let base = (price * scale).floor();
    base.to_u64().ok_or(PriceError::Overflow(price_usd))
}

/// Splits `total_base` units across chunks proportionally to character counts.
///
/// `price_i = floor(chars_i / total_chars × total_base)`, computed in integer
/// arithmetic. An empty chunk list, or one whose total length is zero, yields
/// all-zero prices.
pub fn allocate(total_base: u64, chunk_chars: &[usize]) -> Vec<u64> {
    let total_chars: u128 = chunk_chars.iter().map(|&c| c as u128).sum();
    if total_chars == 0 {
        return vec![0; chunk_chars.len()];
    }
    chunk_chars
        .iter()
        .map(|&chars| {
            let exact = (chars as u128) * (total_base as u128) / total_chars;
            exact as u64
        })
        .collect()
}
