//! Listing cleanup against the fake storefront.

use std::time::Duration;

use rust_decimal_macros::dec;

use sweeper::engine::{Liquidator, LiquidatorSettings};
use sweeper::strategy::CleanupPolicy;

use crate::fake_storefront::FakeStorefront;

fn settings() -> LiquidatorSettings {
    LiquidatorSettings {
        listing_page_delay: Duration::ZERO,
        cleanup_lookup_delay: Duration::ZERO,
        sell_lookup_delay: Duration::ZERO,
        sell_delay: Duration::ZERO,
    }
}

const LISTINGS: &[(&str, &str, &str)] = &[
    ("101", "Axe", "0,05€"),
    ("102", "Bane", "0,10€"),
    ("103", "Crystal", "0,50€"),
];

#[tokio::test]
async fn test_remove_all_removes_every_listing() {
    let fake = FakeStorefront::new(Vec::new()).with_listings(LISTINGS);
    let session = FakeStorefront::session();
    let liquidator = Liquidator::new(&fake, &session, 3, settings());

    let policy = CleanupPolicy {
        remove_all: true,
        ..CleanupPolicy::default()
    };
    let report = liquidator.cleanup(&policy).await;

    assert_eq!(report.checked, 3);
    assert_eq!(report.removed, 3);
    assert_eq!(report.retained_value, dec!(0));
    assert_eq!(fake.removed_listings(), vec!["101", "102", "103"]);
    assert_eq!(fake.calls("priceoverview"), 0);
}

#[tokio::test]
async fn test_cleanup_keeps_fair_listings() {
    let fake = FakeStorefront::new(Vec::new())
        .with_listings(LISTINGS)
        .with_market_price("0,10€");
    let session = FakeStorefront::session();
    let liquidator = Liquidator::new(&fake, &session, 3, settings());

    let report = liquidator.cleanup(&CleanupPolicy::default()).await;

    assert_eq!(report.removed, 1);
    assert_eq!(fake.removed_listings(), vec!["103"]);
    assert!(report.retained_value > dec!(0));
}
