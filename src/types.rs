//! Shared types for the SWEEPER agent.
//!
//! These types form the data model used across all modules: catalog
//! items, buyer policy, wallet, purchase lists, and market listings.
//! They are kept free of I/O so that the crawler, selector, checkout
//! and liquidation modules can depend on them without cycles.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A purchasable unit on the storefront: a single title or a bundle.
///
/// `id` is unique across bundles and singles. For bundles the id is the
/// package id itself and `included_items` lists the child app ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: u64,
    pub name: String,
    pub price: Decimal,
    /// Package the cart needs in order to buy this item.
    pub package_id: Option<u64>,
    pub is_bundle: bool,
    pub included_items: Vec<u64>,
    /// Excluded from the badge count on the platform.
    pub limited: bool,
    pub has_trading_cards: bool,
}

impl fmt::Display for CatalogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) @ {}", self.name, self.id, self.price)?;
        if self.is_bundle {
            write!(f, " [bundle of {}]", self.included_items.len())?;
        }
        Ok(())
    }
}

impl CatalogItem {
    /// Helper to build a test item with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: u64, price: Decimal) -> Self {
        CatalogItem {
            id,
            name: format!("Item {id}"),
            price,
            package_id: Some(id + 100_000),
            is_bundle: false,
            included_items: Vec::new(),
            limited: false,
            has_trading_cards: true,
        }
    }
}

/// One raw row from a search results page, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub name: String,
    pub price: Decimal,
    pub id: u64,
    pub is_bundle: bool,
    pub included_items: Vec<u64>,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Buyer policy
// ---------------------------------------------------------------------------

/// How the selection engine decides when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuyMode {
    /// Buy `limit` items.
    Amount,
    /// Buy until the wallet is empty.
    Max,
    /// Spend up to `limit` in wallet currency.
    Balance,
    /// Show what `limit` items would cost, never check out.
    Preview,
    /// Buy until the next collector badge.
    Next,
}

impl BuyMode {
    /// Modes where `limit` is an item count.
    pub fn counts_items(&self) -> bool {
        matches!(self, BuyMode::Amount | BuyMode::Next | BuyMode::Preview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuyMode::Amount => "amount",
            BuyMode::Max => "max",
            BuyMode::Balance => "balance",
            BuyMode::Preview => "preview",
            BuyMode::Next => "next",
        }
    }
}

impl fmt::Display for BuyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "amount" => Ok(BuyMode::Amount),
            "max" => Ok(BuyMode::Max),
            "balance" | "money" => Ok(BuyMode::Balance),
            "preview" => Ok(BuyMode::Preview),
            "next" => Ok(BuyMode::Next),
            _ => Err(anyhow::anyhow!("Unknown buy mode: {s}")),
        }
    }
}

/// Capability tags a buyer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyOption {
    /// Only items with trading cards that count toward the badge.
    TradingCards,
    /// Items with trading cards, including limited ones.
    TradingCardsLimited,
}

impl BuyOption {
    pub const ALL: &'static [BuyOption] = &[BuyOption::TradingCards, BuyOption::TradingCardsLimited];

    /// Bit used in the persisted account record.
    pub fn bit(&self) -> i64 {
        match self {
            BuyOption::TradingCards => 1 << 0,
            BuyOption::TradingCardsLimited => 1 << 1,
        }
    }
}

/// Convert a persisted bitmask into the set of named options.
pub fn options_from_mask(mask: i64) -> BTreeSet<BuyOption> {
    BuyOption::ALL
        .iter()
        .copied()
        .filter(|o| mask & o.bit() != 0)
        .collect()
}

/// Convert a set of options into the persisted bitmask.
pub fn options_to_mask(options: &BTreeSet<BuyOption>) -> i64 {
    options.iter().fold(0, |acc, o| acc | o.bit())
}

/// User-chosen buying policy. Immutable for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyerConfig {
    pub mode: BuyMode,
    /// Item count or currency amount depending on `mode`.
    #[serde(default)]
    pub limit: Decimal,
    /// Zero means unbounded.
    #[serde(default)]
    pub max_price: Decimal,
    #[serde(default)]
    pub options: BTreeSet<BuyOption>,
}

impl BuyerConfig {
    pub fn wants_trading_cards(&self) -> bool {
        self.options.contains(&BuyOption::TradingCards)
            || self.options.contains(&BuyOption::TradingCardsLimited)
    }

    pub fn accepts_limited(&self) -> bool {
        self.options.contains(&BuyOption::TradingCardsLimited)
    }

    /// Reject policies that cannot be honoured with this wallet.
    /// Runs before any remote mutation.
    pub fn validate(&self, wallet: &Wallet) -> Result<(), SweeperError> {
        if self.limit < Decimal::ZERO || self.max_price < Decimal::ZERO {
            return Err(SweeperError::Policy("limit and max price must not be negative".into()));
        }

        if self.mode == BuyMode::Balance && self.limit > wallet.balance {
            return Err(SweeperError::Policy(format!(
                "cannot spend {} {} with a balance of {} {}",
                self.limit, wallet.currency, wallet.balance, wallet.currency
            )));
        }

        if let Some(ceiling) = crate::strategy::currency::max_search_price(&wallet.currency) {
            if self.max_price > ceiling {
                return Err(SweeperError::Policy(format!(
                    "max price {} exceeds the {} search ceiling of {ceiling}",
                    self.max_price, wallet.currency
                )));
            }
        }

        if self.mode.counts_items() && !self.limit.fract().is_zero() {
            return Err(SweeperError::Policy(format!(
                "mode {} needs a whole item count, got {}",
                self.mode, self.limit
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collector badges
// ---------------------------------------------------------------------------

const BASE_BADGES: &[u32] = &[1, 5, 10, 25, 50, 100, 250, 500, 1000];
const HIGHEST_GAME_BADGE: u32 = 32;

/// All collector badge thresholds in ascending order.
pub fn badge_thresholds() -> Vec<u32> {
    let mut badges = BASE_BADGES.to_vec();
    badges.extend((2..HIGHEST_GAME_BADGE).map(|i| i * 1000));
    badges
}

/// Smallest badge threshold at or above `owned`.
pub fn next_badge(owned: u32) -> Option<u32> {
    badge_thresholds().into_iter().find(|b| *b >= owned)
}

/// Item count needed to go from `owned` to `badge`.
pub fn items_to_badge(owned: u32, badge: u32) -> u32 {
    badge.saturating_sub(owned)
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Wallet as reported by the platform. Read once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub currency: String,
    pub balance: Decimal,
    pub has_wallet: bool,
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.balance, self.currency)
    }
}

// ---------------------------------------------------------------------------
// Purchase list
// ---------------------------------------------------------------------------

/// Ordered, duplicate-free list of items chosen for purchase.
#[derive(Debug, Clone, Default)]
pub struct PurchaseList {
    items: Vec<CatalogItem>,
    ids: HashSet<u64>,
}

impl PurchaseList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Returns false (and leaves the list untouched) when
    /// the id is already present.
    pub fn push(&mut self, item: CatalogItem) -> bool {
        if !self.ids.insert(item.id) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(|i| i.price).sum()
    }

    pub fn average(&self) -> Decimal {
        if self.items.is_empty() {
            Decimal::ZERO
        } else {
            (self.total() / Decimal::from(self.items.len())).round_dp(2)
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogItem> {
        self.items.iter()
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// One of our own listings on the community market. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketListing {
    pub listing_id: String,
    pub name: String,
    /// Item-type key, `<appid>-<item name>`.
    pub hash_name: String,
    pub listing_price: Decimal,
}

/// An inventory item that can be sold.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    pub app_id: u64,
    pub context_id: String,
    pub asset_id: String,
    pub market_hash_name: String,
    pub item_type: String,
    pub marketable: bool,
}

impl InventoryItem {
    pub fn is_trading_card(&self) -> bool {
        self.item_type.contains("Card")
    }

    pub fn is_foil(&self) -> bool {
        self.item_type.contains("Foil")
    }

    pub fn is_background(&self) -> bool {
        self.item_type.contains("Background")
    }

    pub fn is_emoticon(&self) -> bool {
        self.item_type.contains("Emoticon")
    }
}

/// Which trading cards the sell path may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellOption {
    AllTradingCards,
    NormalTradingCards,
    FoilTradingCards,
}

/// How the sale price deduction is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceCalculation {
    /// Subtract a fixed currency amount.
    Fixed,
    /// Subtract a percentage of the market price.
    Percentage,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SWEEPER.
#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error ({what}): {message}")]
    Parse { what: String, message: String },

    #[error("Platform rejected {step}: {message}")]
    PlatformRejected { step: String, message: String },

    #[error("Policy violation: {0}")]
    Policy(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cart repair limit of {limit} reached")]
    RepairLimitExceeded { limit: usize },

    #[error("Transaction {transaction_id} could not be finalized after {attempts} attempts")]
    FinalizeFailed { transaction_id: String, attempts: u32 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
