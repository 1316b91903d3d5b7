//! Storefront endpoints: catalog search, detail pages, the age
//! checkpoint, and account queries (wallet, owned items, badge count).
//!
//! URLs and form fields are platform contracts and kept verbatim.

use std::collections::HashSet;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::parse;
use super::{pairs, RemoteClient, Session};
use crate::strategy::currency::parse_currency_string;
use crate::types::{SweeperError, Wallet};

const STORE_URL: &str = "https://store.steampowered.com";
const SEARCH_URL: &str = "https://store.steampowered.com/search/results/";
const USERDATA_URL: &str = "https://store.steampowered.com/dynamicstore/userdata/";
const GAME_BADGE_URL: &str = "https://steamcommunity.com/my/badges/13";

/// Search category filter for items with trading cards.
const TRADING_CARDS_CATEGORY: &str = "29";

// ---------------------------------------------------------------------------
// Catalog search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results_html: String,
    #[serde(default)]
    pub total_count: u64,
}

/// Query for one page of the price-ascending catalog.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub start: u64,
    pub count: u64,
    pub max_price: Option<Decimal>,
    pub trading_cards_only: bool,
}

pub fn search_url(query: &SearchQuery, session: &Session) -> String {
    let mut params = vec![
        ("start".to_string(), query.start.to_string()),
        ("count".to_string(), query.count.to_string()),
        ("dynamic_data".to_string(), String::new()),
        ("sort_by".to_string(), "Price_ASC".to_string()),
    ];
    if let Some(max) = query.max_price {
        params.push(("maxprice".to_string(), max.to_string()));
    }
    params.extend(pairs([
        ("category1", "998"),
        ("hidef2p", "1"),
        ("ndl", "1"),
        ("snr", "1_7_7_230_7"),
        ("infinite", "1"),
    ]));
    params.push(("sessionid".to_string(), session.session_id.clone()));
    if query.trading_cards_only {
        params.push(("category2".to_string(), TRADING_CARDS_CATEGORY.to_string()));
    }

    let qs: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    format!("{SEARCH_URL}?query&{}", qs.join("&"))
}

/// One fetched search page.
#[derive(Debug)]
pub enum SearchFetch {
    Page(SearchResponse),
    /// The body was not the expected JSON envelope. Carries the raw body.
    Malformed(String),
}

/// Fetch one search page. `None` on transport failure.
pub async fn fetch_search_page(
    client: &dyn RemoteClient,
    session: &Session,
    query: &SearchQuery,
) -> Option<SearchFetch> {
    let url = search_url(query, session);
    debug!(start = query.start, count = query.count, "Fetching search page");

    let body = client.get(&url, &session.headers()).await?;
    match serde_json::from_str(&body) {
        Ok(resp) => Some(SearchFetch::Page(resp)),
        Err(e) => {
            error!(start = query.start, error = %e, "Search page is not valid JSON");
            Some(SearchFetch::Malformed(body))
        }
    }
}

// ---------------------------------------------------------------------------
// Detail pages & age checkpoint
// ---------------------------------------------------------------------------

pub fn detail_url(id: u64) -> String {
    format!("{STORE_URL}/app/{id}?snr=1_direct-navigation__")
}

#[derive(Debug, Deserialize)]
struct AgeCheckResponse {
    #[serde(default)]
    success: i64,
}

/// Submit the fixed birth date for `id` and return the URL the checkpoint
/// page redirects to.
pub async fn bypass_age_gate(
    client: &dyn RemoteClient,
    session: &Session,
    id: u64,
    gate_page: &str,
) -> Option<String> {
    let form = vec![
        ("sessionid".to_string(), session.session_id.clone()),
        ("ageDay".to_string(), "1".to_string()),
        ("ageMonth".to_string(), "January".to_string()),
        ("ageYear".to_string(), "1990".to_string()),
    ];
    let url = format!("{STORE_URL}/agecheckset/app/{id}");

    match client.post(&url, &form, &session.headers()).await {
        Some(body) => match serde_json::from_str::<AgeCheckResponse>(&body) {
            Ok(r) if r.success == 1 => debug!(id, "Age checkpoint passed"),
            Ok(r) => warn!(id, code = r.success, "Age checkpoint rejected"),
            Err(e) => warn!(id, error = %e, "Age checkpoint response is not JSON"),
        },
        None => warn!(id, "Age checkpoint request failed"),
    }

    parse::age_gate_redirect(gate_page)
}

// ---------------------------------------------------------------------------
// Account queries
// ---------------------------------------------------------------------------

/// Wallet balance from the store header. A page without a parseable
/// balance yields a wallet with `has_wallet = false`.
pub async fn fetch_wallet(client: &dyn RemoteClient, session: &Session) -> Result<Wallet> {
    let page = client
        .get(&format!("{STORE_URL}/"), &session.headers())
        .await
        .ok_or_else(|| SweeperError::Transport("store front page unavailable".into()))?;

    let parsed = parse::wallet_balance_text(&page).and_then(|text| parse_currency_string(&text));
    Ok(match parsed {
        Some(money) => Wallet {
            currency: money.currency,
            balance: money.amount,
            has_wallet: true,
        },
        None => {
            warn!("No wallet balance found on store page");
            Wallet {
                currency: String::new(),
                balance: Decimal::ZERO,
                has_wallet: false,
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct UserData {
    #[serde(default, rename = "rgOwnedApps")]
    owned_apps: Vec<u64>,
    #[serde(default, rename = "rgOwnedPackages")]
    owned_packages: Vec<u64>,
}

/// Owned app and package ids, merged.
pub async fn fetch_owned_ids(client: &dyn RemoteClient, session: &Session) -> Result<HashSet<u64>> {
    let body = client
        .get(USERDATA_URL, &session.headers())
        .await
        .ok_or_else(|| SweeperError::Transport("user data unavailable".into()))?;

    let data: UserData = serde_json::from_str(&body).map_err(|e| SweeperError::Parse {
        what: "dynamicstore userdata".into(),
        message: e.to_string(),
    })?;

    Ok(data.owned_apps.into_iter().chain(data.owned_packages).collect())
}

/// Number of owned apps as counted by the collector badge.
pub async fn fetch_owned_app_count(client: &dyn RemoteClient, session: &Session) -> Result<u32> {
    let page = client
        .get(GAME_BADGE_URL, &session.headers())
        .await
        .ok_or_else(|| SweeperError::Transport("badge page unavailable".into()))?;

    let count = parse::badge_owned_count(&page).ok_or_else(|| SweeperError::Parse {
        what: "badge description".into(),
        message: "no owned-app count on badge page".into(),
    })?;
    Ok(count)
}
