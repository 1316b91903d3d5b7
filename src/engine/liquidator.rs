//! Liquidation: cleaning up our own market listings and listing
//! inventory items for sale.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::pricer::MarketPricer;
use crate::platforms::market::{self, COMMUNITY_APP_ID, LISTINGS_PAGE_SIZE};
use crate::platforms::{RemoteClient, Session};
use crate::strategy::{decide_listing, sale_price_minor, CleanupPolicy, ListingDecision, SalePricing, ValueTally};
use crate::types::{InventoryItem, MarketListing, SellOption};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one cleanup pass over our listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiquidationReport {
    pub checked: usize,
    pub removed: usize,
    /// Fee-adjusted value of listings left up.
    pub retained_value: Decimal,
    /// Fee-adjusted value of listings taken down.
    pub removed_value: Decimal,
    /// Listings without a market price.
    pub skipped: usize,
}

/// Outcome of one sell pass over the inventory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaleReport {
    pub listed: usize,
    pub failed: usize,
    /// Items without a market price.
    pub skipped: usize,
    /// Sum of the asked prices, minor units.
    pub total_minor: i64,
}

#[derive(Debug, Clone)]
pub struct LiquidatorSettings {
    pub listing_page_delay: Duration,
    pub cleanup_lookup_delay: Duration,
    pub sell_lookup_delay: Duration,
    pub sell_delay: Duration,
}

impl Default for LiquidatorSettings {
    fn default() -> Self {
        Self {
            listing_page_delay: Duration::from_millis(100),
            cleanup_lookup_delay: Duration::from_millis(300),
            sell_lookup_delay: Duration::from_millis(75),
            sell_delay: Duration::from_millis(125),
        }
    }
}

/// Inventory items the sell path lists, in listing order: trading cards
/// permitted by `options`, then backgrounds, then emoticons.
pub fn sellable_items(inventory: &[InventoryItem], options: &BTreeSet<SellOption>) -> Vec<InventoryItem> {
    let all_cards = options.is_empty() || options.contains(&SellOption::AllTradingCards);
    let wants_card = |item: &InventoryItem| {
        all_cards
            || (item.is_foil() && options.contains(&SellOption::FoilTradingCards))
            || (!item.is_foil() && options.contains(&SellOption::NormalTradingCards))
    };

    let marketable = || inventory.iter().filter(|i| i.marketable);
    let cards = marketable().filter(|i| i.is_trading_card() && wants_card(*i));
    let backgrounds = marketable().filter(|i| i.is_background());
    let emoticons = marketable().filter(|i| i.is_emoticon());

    cards.chain(backgrounds).chain(emoticons).cloned().collect()
}

// ---------------------------------------------------------------------------
// Liquidator
// ---------------------------------------------------------------------------

pub struct Liquidator<'a> {
    client: &'a dyn RemoteClient,
    session: &'a Session,
    currency_id: u32,
    settings: LiquidatorSettings,
}

impl<'a> Liquidator<'a> {
    pub fn new(client: &'a dyn RemoteClient, session: &'a Session, currency_id: u32, settings: LiquidatorSettings) -> Self {
        Self {
            client,
            session,
            currency_id,
            settings,
        }
    }

    /// All of our active listings, page by page.
    pub async fn fetch_market_listings(&self) -> Vec<MarketListing> {
        let mut listings = Vec::new();
        let mut start = 0;

        loop {
            let Some(page) = market::fetch_listings_page(self.client, self.session, start).await else {
                warn!(start, "Listing page unavailable, stopping");
                break;
            };
            listings.extend(page.listings());
            debug!(start, total = page.total_count, "Listing page read");

            if page.is_last() {
                break;
            }
            start += LISTINGS_PAGE_SIZE;
            tokio::time::sleep(self.settings.listing_page_delay).await;
        }

        info!(listings = listings.len(), "Market listings loaded");
        listings
    }

    /// Take down listings that are overpriced, implausible, or all of them
    /// when the policy says so.
    pub async fn cleanup(&self, policy: &CleanupPolicy) -> LiquidationReport {
        let listings = self.fetch_market_listings().await;
        let mut pricer = MarketPricer::new(self.client, self.session, self.currency_id, self.settings.cleanup_lookup_delay);
        let mut tally = ValueTally::default();
        let mut report = LiquidationReport::default();

        for listing in &listings {
            report.checked += 1;

            let decision = if policy.remove_all {
                decide_listing(listing.listing_price, Decimal::ZERO, policy)
            } else {
                let Some(market_price) = pricer.price(COMMUNITY_APP_ID, &listing.hash_name).await else {
                    warn!(listing_id = %listing.listing_id, hash_name = %listing.hash_name, "No market price, listing kept");
                    report.skipped += 1;
                    continue;
                };
                decide_listing(listing.listing_price, market_price, policy)
            };

            if let ListingDecision::Remove(reason) = decision {
                if !market::remove_listing(self.client, self.session, &listing.listing_id).await {
                    warn!(listing_id = %listing.listing_id, "Listing removal failed");
                    tally.record(ListingDecision::Keep, listing.listing_price);
                    continue;
                }
                debug!(listing_id = %listing.listing_id, ?reason, price = %listing.listing_price, "Listing removed");
                report.removed += 1;
            }
            tally.record(decision, listing.listing_price);
        }

        report.retained_value = tally.retained;
        report.removed_value = tally.removed;
        info!(
            checked = report.checked,
            removed = report.removed,
            skipped = report.skipped,
            retained = %report.retained_value,
            removed_value = %report.removed_value,
            "Cleanup finished"
        );
        report
    }

    /// List every sellable inventory item at an undercut market price.
    pub async fn sell(&self, pricing: &SalePricing, options: &BTreeSet<SellOption>) -> Result<SaleReport> {
        let inventory = market::fetch_inventory(self.client, self.session)
            .await
            .context("Failed to load inventory")?;
        let items = sellable_items(&inventory, options);
        info!(inventory = inventory.len(), sellable = items.len(), "Inventory loaded");

        let mut pricer = MarketPricer::new(self.client, self.session, self.currency_id, self.settings.sell_lookup_delay);
        let mut report = SaleReport::default();

        for item in &items {
            let Some(market_price) = pricer.price(item.app_id, &item.market_hash_name).await else {
                warn!(asset_id = %item.asset_id, hash_name = %item.market_hash_name, "No market price, item skipped");
                report.skipped += 1;
                continue;
            };

            let price_minor = sale_price_minor(market_price, pricing);
            if market::sell_item(self.client, self.session, item, price_minor).await {
                debug!(asset_id = %item.asset_id, price_minor, "Item listed");
                report.listed += 1;
                report.total_minor += price_minor;
            } else {
                report.failed += 1;
            }
            tokio::time::sleep(self.settings.sell_delay).await;
        }

        info!(
            listed = report.listed,
            failed = report.failed,
            skipped = report.skipped,
            total_minor = report.total_minor,
            "Sell pass finished"
        );
        Ok(report)
    }
}
