//! Marketplace fee math.
//!
//! The market keeps a fixed fraction of every sale. All net amounts are
//! truncated toward zero at minor-unit precision, so a listing is never
//! valued above what the seller actually receives.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// Fraction of the gross price kept by the marketplace.
pub const FEE_FRACTION: Decimal = dec!(0.13043478261);

/// Smallest price, in minor units, the market accepts for a listing.
pub const PLATFORM_MIN_LISTING_MINOR: i64 = 1;

/// Net amount after fees, truncated to two decimals.
pub fn net_price(gross: Decimal) -> Decimal {
    (gross * (Decimal::ONE - FEE_FRACTION)).round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Net amount after fees for a gross amount already in minor units.
pub fn net_minor_units(gross_minor: i64) -> i64 {
    (Decimal::from(gross_minor) * (Decimal::ONE - FEE_FRACTION))
        .trunc()
        .to_i64()
        .unwrap_or(0)
}

/// Convert a currency amount into minor units (cents), truncating.
pub fn to_minor_units(amount: Decimal) -> i64 {
    (amount * dec!(100)).trunc().to_i64().unwrap_or(0)
}

/// Convert minor units back into a currency amount.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
