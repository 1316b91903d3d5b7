//! Fake storefront for integration testing.
//!
//! Provides a deterministic `RemoteClient` that serves a fixed catalog,
//! detail pages, an account cart, checkout endpoints and our own market
//! listings, all in-memory. Every endpoint hit is counted so tests can
//! assert on network behaviour.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use sweeper::platforms::{RemoteClient, Session};

/// One catalog entry, priced in minor units.
#[derive(Debug, Clone)]
pub struct FakeItem {
    pub id: u64,
    pub price_cents: i64,
    pub has_trading_cards: bool,
    pub limited: bool,
}

impl FakeItem {
    pub fn new(id: u64, price_cents: i64) -> Self {
        Self {
            id,
            price_cents,
            has_trading_cards: true,
            limited: false,
        }
    }

    pub fn name(&self) -> String {
        format!("Game {}", self.id)
    }

    pub fn package_id(&self) -> u64 {
        self.id + 1000
    }
}

pub struct FakeStorefront {
    catalog: Vec<FakeItem>,
    owned: Vec<u64>,
    /// `(listing id, item name, price text)`
    listings: Vec<(String, String, String)>,
    market_price: String,
    init_script: Mutex<VecDeque<String>>,
    cart: Arc<Mutex<Vec<(String, u64)>>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    removed_listings: Arc<Mutex<Vec<String>>>,
    deleted_lines: Arc<Mutex<Vec<String>>>,
}

pub const STARTED: &str = r#"{"success":1,"transid":"TX-1"}"#;

impl FakeStorefront {
    /// Catalog served in ascending price order regardless of input order.
    pub fn new(mut catalog: Vec<FakeItem>) -> Self {
        catalog.sort_by_key(|i| i.price_cents);
        Self {
            catalog,
            owned: Vec::new(),
            listings: Vec::new(),
            market_price: "0,10€".to_string(),
            init_script: Mutex::new(VecDeque::new()),
            cart: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            removed_listings: Arc::new(Mutex::new(Vec::new())),
            deleted_lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_owned(mut self, owned: Vec<u64>) -> Self {
        self.owned = owned;
        self
    }

    pub fn with_listings(mut self, listings: &[(&str, &str, &str)]) -> Self {
        self.listings = listings
            .iter()
            .map(|(id, name, price)| (id.to_string(), name.to_string(), price.to_string()))
            .collect();
        self
    }

    pub fn with_market_price(mut self, price: &str) -> Self {
        self.market_price = price.to_string();
        self
    }

    /// Queue `inittransaction` responses; once drained every call starts
    /// a transaction.
    pub fn script_init(&self, bodies: Vec<String>) {
        self.init_script.lock().unwrap().extend(bodies);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn removed_listings(&self) -> Vec<String> {
        self.removed_listings.lock().unwrap().clone()
    }

    pub fn deleted_lines(&self) -> Vec<String> {
        self.deleted_lines.lock().unwrap().clone()
    }

    pub fn session() -> Session {
        Session::new(
            "sess-it".into(),
            "token-it".into(),
            "76561190000000001".into(),
            "sessionid=sess-it; steamLoginSecure=it".into(),
        )
    }

    fn hit(&self, endpoint: &'static str) {
        *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
    }

    fn query_param(url: &str, name: &str) -> Option<u64> {
        let needle = format!("{name}=");
        let start = url.find(&format!("&{needle}")).map(|i| i + 1).or_else(|| url.find(&format!("?{needle}")).map(|i| i + 1))?;
        url[start + needle.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .ok()
    }

    fn search_page(&self, url: &str) -> String {
        let start = Self::query_param(url, "start").unwrap_or(0) as usize;
        let count = Self::query_param(url, "count").unwrap_or(100) as usize;

        let html: String = self
            .catalog
            .iter()
            .skip(start)
            .take(count)
            .map(|item| {
                format!(
                    r#"<a href="https://store.steampowered.com/app/{id}/" data-ds-appid="{id}"><span class="title">{name}</span><div data-price-final="{cents}"></div></a>"#,
                    id = item.id,
                    name = item.name(),
                    cents = item.price_cents,
                )
            })
            .collect();

        json!({ "results_html": html, "total_count": self.catalog.len() }).to_string()
    }

    fn detail_page(&self, url: &str) -> Option<String> {
        let id: u64 = url
            .split("/app/")
            .nth(1)?
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .ok()?;
        let item = self.catalog.iter().find(|i| i.id == id)?;

        Some(format!(
            r#"<html><body><div class="game_area_purchase_game_wrapper"><input name="subid" value="{sub}"><div data-price-final="{cents}"></div></div>{cards}{limited}</body></html>"#,
            sub = item.package_id(),
            cents = item.price_cents,
            cards = if item.has_trading_cards { "<p>Steam Trading Cards</p>" } else { "" },
            limited = if item.limited { "<p>Profile Features Limited</p>" } else { "" },
        ))
    }

    fn listings_page(&self) -> String {
        let html: String = self
            .listings
            .iter()
            .map(|(id, name, price)| {
                format!(
                    r#"<div class="market_listing_row market_recent_listing_row" id="mylisting_{id}"><span class="market_listing_price">{price}</span><a class="market_listing_item_name_link" href="https://steamcommunity.com/market/listings/753/570-{name}">{name}</a></div>"#
                )
            })
            .collect();

        json!({
            "success": true,
            "total_count": self.listings.len(),
            "start": 0,
            "pagesize": 100,
            "results_html": html,
        })
        .to_string()
    }

    fn add_to_cart(&self, form: &[(String, String)]) -> String {
        let package = form
            .iter()
            .find(|(k, _)| k == "input_json")
            .and_then(|(_, v)| serde_json::from_str::<Value>(v).ok())
            .and_then(|v| v["items"][0]["packageid"].as_u64());

        match package {
            Some(package) => {
                let line = format!("L{package}");
                self.cart.lock().unwrap().push((line.clone(), package));
                json!({ "response": { "line_item_ids": [line] } }).to_string()
            }
            None => json!({ "response": {} }).to_string(),
        }
    }

    fn cart_body(&self) -> String {
        let lines: Vec<Value> = self
            .cart
            .lock()
            .unwrap()
            .iter()
            .map(|(line, package)| json!({ "line_item_id": line, "packageid": package }))
            .collect();
        json!({ "response": { "cart": { "line_items": lines } } }).to_string()
    }
}

#[async_trait]
impl RemoteClient for FakeStorefront {
    async fn get(&self, url: &str, _headers: &[(String, String)]) -> Option<String> {
        if url.contains("/search/results/") {
            self.hit("search");
            Some(self.search_page(url))
        } else if url.contains("store.steampowered.com/app/") {
            self.hit("detail");
            self.detail_page(url)
        } else if url.contains("/dynamicstore/userdata/") {
            self.hit("userdata");
            Some(json!({ "rgOwnedApps": &self.owned, "rgOwnedPackages": [] }).to_string())
        } else if url.contains("/mylistings/render/") {
            self.hit("listings");
            Some(self.listings_page())
        } else if url.contains("/priceoverview/") {
            self.hit("priceoverview");
            Some(json!({ "success": true, "lowest_price": &self.market_price }).to_string())
        } else if url.contains("/GetCart/") {
            self.hit("GetCart");
            Some(self.cart_body())
        } else if url.contains("/getfinalprice/") {
            self.hit("getfinalprice");
            Some(r#"{"formattedSteamAccountTotal":"1,47€"}"#.to_string())
        } else {
            self.hit("unknown");
            None
        }
    }

    async fn post(&self, url: &str, form: &[(String, String)], _headers: &[(String, String)]) -> Option<String> {
        if url.contains("/DeleteCart/") {
            self.hit("DeleteCart");
            self.cart.lock().unwrap().clear();
            Some("{}".to_string())
        } else if url.contains("/AddItemsToCart/") {
            self.hit("AddItemsToCart");
            Some(self.add_to_cart(form))
        } else if url.contains("/DeleteLineItem/") {
            self.hit("DeleteLineItem");
            let line = form.iter().find(|(k, _)| k == "line_item_id")?.1.clone();
            self.cart.lock().unwrap().retain(|(l, _)| *l != line);
            self.deleted_lines.lock().unwrap().push(line);
            Some("{}".to_string())
        } else if url.contains("/inittransaction/") {
            self.hit("inittransaction");
            let scripted = self.init_script.lock().unwrap().pop_front();
            Some(scripted.unwrap_or_else(|| STARTED.to_string()))
        } else if url.contains("/finalizetransaction/") {
            self.hit("finalizetransaction");
            Some(r#"{"success":22}"#.to_string())
        } else if url.contains("/removelisting/") {
            self.hit("removelisting");
            let id = url.rsplit('/').next()?.to_string();
            self.removed_listings.lock().unwrap().push(id);
            Some("[]".to_string())
        } else {
            self.hit("unknown");
            None
        }
    }
}

/// `inittransaction` body blaming `name`.
pub fn reject_body(name: &str) -> String {
    json!({
        "success": 2,
        "appcausingerror": 1,
        "specificerrortext": format!("\"{name}\" is not available in your region."),
    })
    .to_string()
}
