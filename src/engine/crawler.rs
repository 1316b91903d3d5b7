//! Catalog crawler.
//!
//! Pages through the storefront search in ascending price order and
//! classifies every listing row, memoising classification in the item
//! store. The output is a lazy stream: nothing is fetched until the
//! consumer polls, and dropping the stream stops the crawl.

use std::collections::HashSet;
use std::time::Duration;

use async_stream::stream;
use futures::future::join_all;
use futures::Stream;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

use crate::platforms::parse::{self, PackageLookup};
use crate::platforms::store::{self, SearchFetch, SearchQuery};
use crate::platforms::{RemoteClient, Session};
use crate::storage::{DebugSink, ItemStore, KeyedLocks};
use crate::strategy::currency::max_search_price;
use crate::types::{BuyerConfig, CatalogItem, ListingRow, Wallet};

// ---------------------------------------------------------------------------
// Policy constants
// ---------------------------------------------------------------------------

/// When more than this share of one page is above `max_price`, the rest of
/// the price-sorted catalog is assumed out of budget and the crawl ends.
pub const MAX_PRICE_OVERFLOW_RATIO: Decimal = dec!(0.5);

/// Consecutive pages without usable rows before the catalog is considered
/// exhausted.
pub const MAX_EMPTY_PAGES: u32 = 5;

#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    pub page_size: u64,
    /// Pause before every search page request.
    pub page_delay: Duration,
    /// Pause before every detail page request.
    pub item_delay: Duration,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            page_delay: Duration::from_millis(25),
            item_delay: Duration::from_millis(75),
        }
    }
}

/// Inputs of one crawl.
#[derive(Debug, Clone, Copy)]
pub struct CrawlRequest<'r> {
    pub buyer: &'r BuyerConfig,
    pub wallet: &'r Wallet,
    pub owned: &'r HashSet<u64>,
    /// Ids already known to be limited; they are not re-classified.
    pub limited: &'r HashSet<u64>,
    pub start: u64,
}

/// Share of `rows` priced above `max_price` exceeds the overflow ratio.
/// A zero `max_price` means unbounded.
pub fn page_exceeds_budget(rows: &[ListingRow], max_price: Decimal) -> bool {
    if max_price.is_zero() || rows.is_empty() {
        return false;
    }
    let over = rows.iter().filter(|r| r.price > max_price).count();
    Decimal::from(over) / Decimal::from(rows.len()) > MAX_PRICE_OVERFLOW_RATIO
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

pub struct Crawler<'a> {
    client: &'a dyn RemoteClient,
    session: &'a Session,
    store: &'a dyn ItemStore,
    sink: &'a DebugSink,
    settings: CrawlerSettings,
    locks: KeyedLocks,
}

impl<'a> Crawler<'a> {
    pub fn new(
        client: &'a dyn RemoteClient,
        session: &'a Session,
        store: &'a dyn ItemStore,
        sink: &'a DebugSink,
        settings: CrawlerSettings,
    ) -> Self {
        Self {
            client,
            session,
            store,
            sink,
            settings,
            locks: KeyedLocks::new(),
        }
    }

    /// Lazily yield classified items in catalog order.
    pub fn crawl<'s>(&'s self, req: CrawlRequest<'s>) -> impl Stream<Item = CatalogItem> + 's {
        stream! {
            let mut offset = req.start;
            let mut empty_pages = 0u32;
            let query_max = max_search_price(&req.wallet.currency);
            let trading_cards_only = req.buyer.wants_trading_cards();

            loop {
                tokio::time::sleep(self.settings.page_delay).await;

                let query = SearchQuery {
                    start: offset,
                    count: self.settings.page_size,
                    max_price: query_max,
                    trading_cards_only,
                };
                offset += self.settings.page_size;

                let response = store::fetch_search_page(self.client, self.session, &query).await;
                let (rows, total_count) = match response {
                    Some(SearchFetch::Page(resp)) => (self.page_rows(query.start, &resp.results_html), resp.total_count),
                    Some(SearchFetch::Malformed(body)) => {
                        self.sink.write_timestamped("malformed_page", &body);
                        (Vec::new(), 0)
                    }
                    None => (Vec::new(), 0),
                };

                if rows.is_empty() {
                    empty_pages += 1;
                    if empty_pages >= MAX_EMPTY_PAGES {
                        info!(offset = query.start, "No usable rows on consecutive pages, stopping crawl");
                        break;
                    }
                    if total_count > 0 && offset >= total_count {
                        info!(total_count, "Catalog exhausted");
                        break;
                    }
                    continue;
                }
                empty_pages = 0;

                if page_exceeds_budget(&rows, req.buyer.max_price) {
                    warn!(
                        rows = rows.len(),
                        max_price = %req.buyer.max_price,
                        currency = %req.wallet.currency,
                        "More than half of the page is over the max price, stopping crawl"
                    );
                    break;
                }

                let classified = join_all(rows.iter().map(|row| self.resolve(row, &req))).await;
                debug!(offset = query.start, rows = rows.len(), "Search page classified");

                for item in classified.into_iter().flatten() {
                    yield item;
                }

                if total_count > 0 && offset >= total_count {
                    info!(total_count, "Catalog exhausted");
                    break;
                }
            }
        }
    }

    /// Parse a results fragment, dumping anything unusable.
    fn page_rows(&self, start: u64, results_html: &str) -> Vec<ListingRow> {
        let page = parse::parse_search_results(results_html);

        for row_html in &page.rows_without_id {
            warn!(offset = start, "Listing row without an id, dropped");
            self.sink.write_timestamped("noappid", row_html);
        }

        if page.price_elements == 0 {
            error!(offset = start, "Search page has no price elements, treating as empty");
            self.sink.write_timestamped("malformed_page", results_html);
        }

        page.rows
    }

    /// Classified record for one listing row, or `None` when the row
    /// cannot be classified.
    async fn resolve(&self, row: &ListingRow, req: &CrawlRequest<'_>) -> Option<CatalogItem> {
        if row.is_bundle {
            return self.classify_bundle(row, req).await;
        }

        if req.owned.contains(&row.id) || req.limited.contains(&row.id) {
            return self.stored(row.id).await;
        }

        self.classify_single(row).await
    }

    async fn stored(&self, id: u64) -> Option<CatalogItem> {
        match self.store.get(id).await {
            Ok(item) => item,
            Err(e) => {
                warn!(item_id = id, error = %e, "Item store read failed");
                None
            }
        }
    }

    async fn save(&self, item: &CatalogItem) {
        if let Err(e) = self.store.upsert(item).await {
            warn!(item_id = item.id, error = %e, "Item store write failed");
        }
    }

    /// Stored record when its price still matches the listing.
    async fn cache_hit(&self, row: &ListingRow) -> Option<CatalogItem> {
        let stored = self.stored(row.id).await?;
        if stored.price == row.price {
            debug!(item_id = row.id, "Classification cache hit");
            Some(stored)
        } else {
            None
        }
    }

    /// Fetch a detail page, passing the age checkpoint when one is
    /// interposed.
    async fn fetch_detail(&self, id: u64, url: &str) -> Option<String> {
        tokio::time::sleep(self.settings.item_delay).await;

        let page = self.client.get(url, &self.session.headers()).await?;
        if !parse::is_age_gate(&page) {
            return Some(page);
        }

        debug!(item_id = id, "Age checkpoint found");
        let Some(redirect) = store::bypass_age_gate(self.client, self.session, id, &page).await else {
            warn!(item_id = id, "Age checkpoint without redirect target");
            return None;
        };

        let page = self.client.get(&redirect, &self.session.headers()).await?;
        if parse::is_age_gate(&page) {
            warn!(item_id = id, "Still behind the age checkpoint after bypass");
            return None;
        }
        Some(page)
    }

    async fn classify_single(&self, row: &ListingRow) -> Option<CatalogItem> {
        let _guard = self.locks.lock(row.id).await;

        if let Some(item) = self.cache_hit(row).await {
            return Some(item);
        }

        let page = self.fetch_detail(row.id, &store::detail_url(row.id)).await?;

        let package_id = match parse::purchase_package(&page, row.price) {
            PackageLookup::Found(package_id) => package_id,
            PackageLookup::NoPurchaseBlocks => {
                error!(item_id = row.id, "No purchase blocks on detail page");
                return None;
            }
            PackageLookup::PriceMismatch => {
                error!(item_id = row.id, price = %row.price, "No purchase block at the listed price");
                self.sink.write("price_mismatch", &row.id.to_string(), &page);
                return None;
            }
            PackageLookup::MissingSubId => {
                warn!(item_id = row.id, "No package id on detail page");
                self.sink.write("nosubid", &row.id.to_string(), &page);
                return None;
            }
        };

        let flags = parse::detail_flags(&page);
        let item = CatalogItem {
            id: row.id,
            name: row.name.clone(),
            price: row.price,
            package_id: Some(package_id),
            is_bundle: false,
            included_items: Vec::new(),
            limited: flags.limited,
            has_trading_cards: flags.has_trading_cards,
        };

        self.save(&item).await;
        debug!(item_id = item.id, limited = item.limited, cards = item.has_trading_cards, "Item classified");
        Some(item)
    }

    /// Classify a bundle and each of its children. Only the bundle is
    /// returned; children are recorded in the store.
    ///
    /// The bundle's lock is never held while a child is classified, so
    /// bundles listing each other cannot wait on one another.
    async fn classify_bundle(&self, row: &ListingRow, req: &CrawlRequest<'_>) -> Option<CatalogItem> {
        {
            let _guard = self.locks.lock(row.id).await;
            if let Some(item) = self.cache_hit(row).await {
                return Some(item);
            }
        }

        let mut visited = HashSet::from([row.id]);
        for child in &row.included_items {
            if !visited.insert(*child) {
                debug!(bundle_id = row.id, child_id = child, "Child already visited, skipped");
                continue;
            }
            if req.owned.contains(child) || req.limited.contains(child) {
                continue;
            }
            self.classify_child(*child, row).await;
        }

        let _guard = self.locks.lock(row.id).await;
        let page = self.fetch_detail(row.id, &row.url).await?;
        let flags = parse::detail_flags(&page);

        let item = CatalogItem {
            id: row.id,
            name: row.name.clone(),
            price: row.price,
            package_id: Some(row.id),
            is_bundle: true,
            included_items: row.included_items.iter().copied().filter(|c| *c != row.id).collect(),
            limited: flags.limited,
            has_trading_cards: flags.has_trading_cards,
        };

        self.save(&item).await;
        debug!(bundle_id = item.id, children = item.included_items.len(), "Bundle classified");
        Some(item)
    }

    /// Refresh the flags of one bundle child. The child's own price is
    /// unknown here, so an existing record keeps its price and only has
    /// its flags updated.
    async fn classify_child(&self, id: u64, bundle: &ListingRow) {
        let _guard = self.locks.lock(id).await;

        let Some(page) = self.fetch_detail(id, &store::detail_url(id)).await else {
            warn!(bundle_id = bundle.id, child_id = id, "Bundle child detail page unavailable");
            return;
        };
        let flags = parse::detail_flags(&page);

        match self.stored(id).await {
            Some(existing) => {
                if existing.limited != flags.limited || existing.has_trading_cards != flags.has_trading_cards {
                    if let Err(e) = self.store.update_flags(id, flags.limited, flags.has_trading_cards).await {
                        warn!(item_id = id, error = %e, "Flag update failed");
                    }
                }
            }
            None => {
                let package_id = match parse::purchase_package(&page, Decimal::ZERO) {
                    PackageLookup::Found(p) => Some(p),
                    _ => None,
                };
                let child = CatalogItem {
                    id,
                    name: format!("{} (item {id})", bundle.name),
                    price: Decimal::ZERO,
                    package_id,
                    is_bundle: false,
                    included_items: Vec::new(),
                    limited: flags.limited,
                    has_trading_cards: flags.has_trading_cards,
                };
                self.save(&child).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
