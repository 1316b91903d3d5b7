//! HTML extraction for storefront and market pages.
//!
//! Everything here is synchronous: `scraper::Html` is not `Send`, so
//! documents are parsed and dropped inside these helpers and only owned
//! values cross an `.await`.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use crate::strategy::fees::{from_minor_units, to_minor_units};
use crate::types::ListingRow;

const BUNDLE_URL_PREFIX: &str = "https://store.steampowered.com/sub/";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static ROW: Lazy<Selector> = Lazy::new(|| selector("a"));
static PRICE_FINAL: Lazy<Selector> = Lazy::new(|| selector("[data-price-final]"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector(".title"));
static AGE_GATE: Lazy<Selector> = Lazy::new(|| selector("#view_product_page_btn"));
static PURCHASE_BLOCK: Lazy<Selector> = Lazy::new(|| selector(".game_area_purchase_game_wrapper"));
static SUBID_INPUT: Lazy<Selector> = Lazy::new(|| selector("input[name=subid]"));
static WALLET_BALANCE: Lazy<Selector> = Lazy::new(|| selector("#header_wallet_balance"));
static BADGE_DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector(".badge_description"));
static MULTIBUY_PRICE: Lazy<Selector> =
    Lazy::new(|| selector(".market_dialog_input.market_multi_price"));
static LISTING_ROW: Lazy<Selector> =
    Lazy::new(|| selector(".market_listing_row.market_recent_listing_row"));
static LISTING_GAME_NAME: Lazy<Selector> = Lazy::new(|| selector(".market_listing_game_name"));
static LISTING_PRICE: Lazy<Selector> = Lazy::new(|| selector(".market_listing_price"));
static LISTING_ITEM_LINK: Lazy<Selector> = Lazy::new(|| selector(".market_listing_item_name_link"));

static AGE_REDIRECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"document\.location = "(.*)";"#).expect("valid regex"));
static LIMITED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Profile Features Limited|Steam is learning about this game").expect("valid regex")
});
static CARDS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Steam Trading Cards").expect("valid regex"));

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn first_text(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel).next().map(text_of)
}

fn cents_attr(el: ElementRef<'_>) -> Option<i64> {
    el.select(&PRICE_FINAL)
        .next()
        .and_then(|p| p.value().attr("data-price-final"))
        .and_then(|raw| raw.replace(',', "").trim().parse().ok())
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// One parsed search results page.
#[derive(Debug, Default)]
pub struct SearchPage {
    pub rows: Vec<ListingRow>,
    /// Number of `[data-price-final]` elements seen. Zero means the page is
    /// malformed.
    pub price_elements: usize,
    /// Markup of rows that carried no app id.
    pub rows_without_id: Vec<String>,
}

pub fn parse_search_results(results_html: &str) -> SearchPage {
    let doc = Html::parse_fragment(results_html);
    let mut page = SearchPage {
        price_elements: doc.select(&PRICE_FINAL).count(),
        ..SearchPage::default()
    };

    for el in doc.select(&ROW) {
        let Some(cents) = cents_attr(el) else { continue };
        let Some(app_ids) = el.value().attr("data-ds-appid") else {
            page.rows_without_id.push(el.html());
            continue;
        };

        let url = el.value().attr("href").unwrap_or_default().to_string();
        let name = first_text(el, &TITLE).unwrap_or_default();
        let price = from_minor_units(cents);
        let children: Vec<u64> = app_ids
            .split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect();

        let row = if url.starts_with(BUNDLE_URL_PREFIX) {
            let Some(sub_id) = url.split('/').nth(4).and_then(|s| s.parse().ok()) else {
                page.rows_without_id.push(el.html());
                continue;
            };
            ListingRow { name, price, id: sub_id, is_bundle: true, included_items: children, url }
        } else {
            let Some(id) = children.first().copied() else {
                page.rows_without_id.push(el.html());
                continue;
            };
            ListingRow { name, price, id, is_bundle: false, included_items: Vec::new(), url }
        };

        page.rows.push(row);
    }

    page
}

// ---------------------------------------------------------------------------
// Detail pages
// ---------------------------------------------------------------------------

pub fn is_age_gate(page: &str) -> bool {
    Html::parse_document(page).select(&AGE_GATE).next().is_some()
}

/// URL the age checkpoint redirects to once the age is set.
pub fn age_gate_redirect(page: &str) -> Option<String> {
    let captured = AGE_REDIRECT_RE.captures(page)?.get(1)?.as_str();
    let url: String = captured.chars().filter(|c| !matches!(c, '"' | ';' | '\\')).collect();
    (!url.is_empty()).then_some(url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailFlags {
    pub limited: bool,
    pub has_trading_cards: bool,
}

pub fn detail_flags(page: &str) -> DetailFlags {
    DetailFlags {
        limited: LIMITED_RE.is_match(page),
        has_trading_cards: CARDS_RE.is_match(page),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLookup {
    Found(u64),
    /// No purchase blocks on the page at all.
    NoPurchaseBlocks,
    /// No purchase block is offered at the observed price.
    PriceMismatch,
    /// The matching block carries no package id.
    MissingSubId,
}

/// Find the package id of the purchase block priced at `price`.
pub fn purchase_package(page: &str, price: Decimal) -> PackageLookup {
    let doc = Html::parse_document(page);
    let blocks: Vec<_> = doc.select(&PURCHASE_BLOCK).collect();
    if blocks.is_empty() {
        return PackageLookup::NoPurchaseBlocks;
    }

    let cents = to_minor_units(price);
    let Some(block) = blocks.into_iter().find(|b| cents_attr(*b) == Some(cents)) else {
        return PackageLookup::PriceMismatch;
    };

    block
        .select(&SUBID_INPUT)
        .next()
        .and_then(|input| input.value().attr("value"))
        .and_then(|v| v.trim().parse().ok())
        .map_or(PackageLookup::MissingSubId, PackageLookup::Found)
}

// ---------------------------------------------------------------------------
// Account pages
// ---------------------------------------------------------------------------

pub fn wallet_balance_text(page: &str) -> Option<String> {
    let doc = Html::parse_document(page);
    let text = doc.select(&WALLET_BALANCE).next().map(text_of)?;
    (!text.is_empty()).then_some(text)
}

/// Digits of the collector badge description, e.g. "1,234 games owned".
pub fn badge_owned_count(page: &str) -> Option<u32> {
    let doc = Html::parse_document(page);
    let text = doc.select(&BADGE_DESCRIPTION).next().map(text_of)?;
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// Market pages
// ---------------------------------------------------------------------------

pub fn multibuy_price_text(page: &str) -> Option<String> {
    let doc = Html::parse_document(page);
    let value = doc.select(&MULTIBUY_PRICE).next()?.value().attr("value")?;
    Some(value.trim().to_string())
}

/// A listing row before its price string is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub listing_id: String,
    pub name: String,
    pub hash_name: String,
    pub price_text: String,
}

/// Our own listings from a `mylistings/render` fragment. Rows missing an
/// id or item link are skipped.
pub fn market_listing_rows(results_html: &str) -> Vec<RawListing> {
    let doc = Html::parse_fragment(results_html);
    doc.select(&LISTING_ROW)
        .filter_map(|row| {
            let listing_id = row.value().id()?.strip_prefix("mylisting_")?.to_string();
            let link = row.select(&LISTING_ITEM_LINK).next()?;
            // .../market/listings/753/<appid>-<name>
            let app_id = link.value().attr("href")?.split('-').next()?.split('/').nth(6)?;

            Some(RawListing {
                listing_id,
                name: first_text(row, &LISTING_GAME_NAME).unwrap_or_default(),
                hash_name: format!("{app_id}-{}", text_of(link)),
                price_text: first_text(row, &LISTING_PRICE).unwrap_or_default(),
            })
        })
        .collect()
}
