//! Community market endpoints: price lookups, our own listings,
//! inventory and selling.

use std::collections::HashMap;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::parse;
use super::{RemoteClient, Session};
use crate::strategy::currency::parse_currency_string;
use crate::types::{InventoryItem, MarketListing, SweeperError};

const MARKET_URL: &str = "https://steamcommunity.com/market";
const MARKET_REFERER: &str = "https://steamcommunity.com/market/";

/// Community items app and context.
pub const COMMUNITY_APP_ID: u64 = 753;
pub const COMMUNITY_CONTEXT_ID: &str = "6";

/// Page size of the `mylistings/render` endpoint.
pub const LISTINGS_PAGE_SIZE: u64 = 100;

fn market_headers(session: &Session) -> Vec<(String, String)> {
    vec![
        ("Cookie".to_string(), session.cookie_header()),
        ("Referer".to_string(), MARKET_REFERER.to_string()),
    ]
}

/// Hash names are used in URL paths, so `/` must not appear in them.
pub fn fix_hash_name(hash_name: &str) -> String {
    hash_name.replace('/', "-")
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PriceOverview {
    success: Option<Value>,
    lowest_price: Option<String>,
}

/// Lowest listed price from the price overview endpoint. `None` when the
/// response lacks the field, so the caller can fall back.
pub async fn price_overview(
    client: &dyn RemoteClient,
    session: &Session,
    app_id: u64,
    hash_name: &str,
    currency_id: u32,
) -> Option<Decimal> {
    let url = format!(
        "{MARKET_URL}/priceoverview/?currency={currency_id}&appid={app_id}&market_hash_name={}",
        urlencoding::encode(hash_name)
    );
    let body = client.get(&url, &market_headers(session)).await?;
    let overview: PriceOverview = serde_json::from_str(&body).ok()?;
    overview.success?;

    let text = overview.lowest_price?;
    let money = parse_currency_string(&text);
    if money.is_none() {
        debug!(hash_name, text, "Unparseable lowest price");
    }
    money.map(|m| m.amount)
}

/// Price from the multi-buy dialog's pre-filled input.
pub async fn multibuy_price(
    client: &dyn RemoteClient,
    session: &Session,
    app_id: u64,
    hash_name: &str,
) -> Option<Decimal> {
    let url = format!(
        "{MARKET_URL}/multibuy?appid={app_id}&contextid=2&items[]={}",
        urlencoding::encode(hash_name)
    );
    let page = client.get(&url, &market_headers(session)).await?;
    let text = parse::multibuy_price_text(&page)?;
    parse_currency_string(&text).map(|m| m.amount)
}

// ---------------------------------------------------------------------------
// Own listings
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListingsPage {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub pagesize: u64,
    #[serde(default)]
    pub results_html: String,
}

impl ListingsPage {
    /// Parse the rows into listings; rows with an unreadable price are
    /// dropped with a warning.
    pub fn listings(&self) -> Vec<MarketListing> {
        parse::market_listing_rows(&self.results_html)
            .into_iter()
            .filter_map(|raw| match parse_currency_string(&raw.price_text) {
                Some(money) => Some(MarketListing {
                    listing_id: raw.listing_id,
                    name: raw.name,
                    hash_name: raw.hash_name,
                    listing_price: money.amount,
                }),
                None => {
                    warn!(listing_id = %raw.listing_id, price = %raw.price_text, "Listing price unreadable");
                    None
                }
            })
            .collect()
    }

    pub fn is_last(&self) -> bool {
        self.start + self.pagesize >= self.total_count
    }
}

pub async fn fetch_listings_page(client: &dyn RemoteClient, session: &Session, start: u64) -> Option<ListingsPage> {
    let url = format!("{MARKET_URL}/mylistings/render/?query=&start={start}&count={LISTINGS_PAGE_SIZE}");
    let body = client.get(&url, &session.headers()).await?;
    match serde_json::from_str::<ListingsPage>(&body) {
        Ok(page) if page.success => Some(page),
        Ok(_) => {
            warn!(start, "Listings page reported failure");
            None
        }
        Err(e) => {
            warn!(start, error = %e, "Listings page is not JSON");
            None
        }
    }
}

pub async fn remove_listing(client: &dyn RemoteClient, session: &Session, listing_id: &str) -> bool {
    let form = vec![("sessionid".to_string(), session.session_id.clone())];
    let url = format!("{MARKET_URL}/removelisting/{listing_id}");
    client.post(&url, &form, &market_headers(session)).await.is_some()
}

// ---------------------------------------------------------------------------
// Inventory & selling
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct InventoryResponse {
    #[serde(default)]
    assets: Vec<Asset>,
    #[serde(default)]
    descriptions: Vec<Description>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    appid: u64,
    contextid: String,
    assetid: String,
    classid: String,
    instanceid: String,
}

#[derive(Debug, Deserialize)]
struct Description {
    classid: String,
    instanceid: String,
    #[serde(default)]
    market_hash_name: String,
    #[serde(default, rename = "type")]
    item_type: String,
    #[serde(default)]
    marketable: i64,
}

/// Community inventory with each asset joined to its description.
pub async fn fetch_inventory(client: &dyn RemoteClient, session: &Session) -> Result<Vec<InventoryItem>> {
    let url = format!(
        "https://steamcommunity.com/inventory/{}/{COMMUNITY_APP_ID}/{COMMUNITY_CONTEXT_ID}?l=english&count=2000",
        session.steam_id
    );
    let body = client
        .get(&url, &session.headers())
        .await
        .ok_or_else(|| SweeperError::Transport("inventory unavailable".into()))?;
    let inventory: InventoryResponse = serde_json::from_str(&body).map_err(|e| SweeperError::Parse {
        what: "inventory".into(),
        message: e.to_string(),
    })?;

    Ok(join_inventory(inventory))
}

fn join_inventory(inventory: InventoryResponse) -> Vec<InventoryItem> {
    let descriptions: HashMap<(&str, &str), &Description> = inventory
        .descriptions
        .iter()
        .map(|d| ((d.classid.as_str(), d.instanceid.as_str()), d))
        .collect();

    inventory
        .assets
        .iter()
        .filter_map(|asset| {
            let desc = descriptions.get(&(asset.classid.as_str(), asset.instanceid.as_str()))?;
            Some(InventoryItem {
                app_id: asset.appid,
                context_id: asset.contextid.clone(),
                asset_id: asset.assetid.clone(),
                market_hash_name: desc.market_hash_name.clone(),
                item_type: desc.item_type.clone(),
                marketable: desc.marketable != 0,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SellResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// List one item for `price_minor` (seller receives, minor units).
pub async fn sell_item(client: &dyn RemoteClient, session: &Session, item: &InventoryItem, price_minor: i64) -> bool {
    let form = vec![
        ("sessionid".to_string(), session.session_id.clone()),
        ("appid".to_string(), item.app_id.to_string()),
        ("contextid".to_string(), item.context_id.clone()),
        ("assetid".to_string(), item.asset_id.clone()),
        ("amount".to_string(), "1".to_string()),
        ("price".to_string(), price_minor.to_string()),
    ];
    let headers = vec![
        ("Cookie".to_string(), session.cookie_header()),
        (
            "Referer".to_string(),
            format!("https://steamcommunity.com/profiles/{}/inventory/", session.steam_id),
        ),
    ];

    let Some(body) = client.post(&format!("{MARKET_URL}/sellitem/"), &form, &headers).await else {
        return false;
    };
    match serde_json::from_str::<SellResponse>(&body) {
        Ok(r) if r.success => true,
        Ok(r) => {
            warn!(asset_id = %item.asset_id, message = ?r.message, "Sell request rejected");
            false
        }
        Err(_) => false,
    }
}
