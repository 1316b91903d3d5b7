//! Arbitrage decisions for the liquidation path.
//!
//! Given the current market price of an item type, decide whether one of
//! our listings stays up or comes down, and what an unlisted item should
//! be listed for.

pub mod currency;
pub mod fees;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::PriceCalculation;
use fees::{net_price, PLATFORM_MIN_LISTING_MINOR};

// ---------------------------------------------------------------------------
// Listing cleanup
// ---------------------------------------------------------------------------

/// Market prices above this are treated as implausible.
pub const DEFAULT_SANITY_CEILING: Decimal = dec!(5);

#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    pub sanity_ceiling: Decimal,
    /// Take every listing down regardless of price.
    pub remove_all: bool,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            sanity_ceiling: DEFAULT_SANITY_CEILING,
            remove_all: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Listed above the current lowest price.
    Overpriced,
    /// Market price is above the sanity ceiling.
    AboveCeiling,
    RemoveAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingDecision {
    Keep,
    Remove(RemovalReason),
}

/// Keep-vs-remove for one listing.
pub fn decide_listing(
    listing_price: Decimal,
    market_price: Decimal,
    policy: &CleanupPolicy,
) -> ListingDecision {
    if policy.remove_all {
        return ListingDecision::Remove(RemovalReason::RemoveAll);
    }
    if listing_price > market_price {
        return ListingDecision::Remove(RemovalReason::Overpriced);
    }
    if market_price > policy.sanity_ceiling {
        return ListingDecision::Remove(RemovalReason::AboveCeiling);
    }
    ListingDecision::Keep
}

/// Fee-adjusted value of kept and removed listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTally {
    pub retained: Decimal,
    pub removed: Decimal,
}

impl ValueTally {
    pub fn record(&mut self, decision: ListingDecision, listing_price: Decimal) {
        let net = net_price(listing_price);
        match decision {
            ListingDecision::Keep => self.retained += net,
            ListingDecision::Remove(_) => self.removed += net,
        }
    }
}

// ---------------------------------------------------------------------------
// Sale pricing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SalePricing {
    pub calculation: PriceCalculation,
    /// Currency amount for `Fixed`, percent for `Percentage`.
    pub deduction: Decimal,
    /// User floor in currency units; the platform floor always applies.
    pub min_price: Decimal,
}

/// Price, in minor units, that a seller should ask for an item currently
/// trading at `market_price`. Below-floor prices are clamped up.
pub fn sale_price_minor(market_price: Decimal, pricing: &SalePricing) -> i64 {
    let undercut = match pricing.calculation {
        PriceCalculation::Fixed => market_price - pricing.deduction,
        PriceCalculation::Percentage => market_price - market_price * (pricing.deduction / dec!(100)),
    };

    let net = fees::net_minor_units(fees::to_minor_units(undercut.max(Decimal::ZERO)));
    let floor = PLATFORM_MIN_LISTING_MINOR.max(fees::to_minor_units(pricing.min_price));

    if net < floor {
        debug!(market_price = %market_price, net, floor, "Sale price clamped to floor");
        floor
    } else {
        net
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
