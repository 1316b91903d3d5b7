//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Session secrets are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use std::collections::BTreeSet;
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::engine::{CrawlerSettings, LiquidatorSettings};
use crate::platforms::session::SessionEnv;
use crate::strategy::{CleanupPolicy, SalePricing, DEFAULT_SANITY_CEILING};
use crate::types::{BuyMode, BuyOption, BuyerConfig, PriceCalculation, SellOption};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub storefront: StorefrontConfig,
    /// Absent means "use the record persisted for the account".
    #[serde(default)]
    pub buyer: Option<BuyerSection>,
    #[serde(default)]
    pub seller: SellerConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Key of the persisted buyer record.
    pub account: String,
    #[serde(default)]
    pub session: SessionEnv,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorefrontConfig {
    pub page_size: u64,
    pub page_delay_ms: u64,
    pub item_delay_ms: u64,
    pub listing_page_delay_ms: u64,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            page_delay_ms: 25,
            item_delay_ms: 75,
            listing_page_delay_ms: 100,
        }
    }
}

impl StorefrontConfig {
    pub fn crawler_settings(&self) -> CrawlerSettings {
        CrawlerSettings {
            page_size: self.page_size,
            page_delay: Duration::from_millis(self.page_delay_ms),
            item_delay: Duration::from_millis(self.item_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuyerSection {
    pub mode: BuyMode,
    #[serde(default)]
    pub limit: Decimal,
    #[serde(default)]
    pub max_price: Decimal,
    #[serde(default)]
    pub options: BTreeSet<BuyOption>,
    /// Save this configuration as the account record.
    #[serde(default)]
    pub persist: bool,
    /// Target badge for `preview`; the next badge when unset.
    #[serde(default)]
    pub badge: Option<u32>,
}

impl BuyerSection {
    pub fn buyer_config(&self) -> BuyerConfig {
        BuyerConfig {
            mode: self.mode,
            limit: self.limit,
            max_price: self.max_price,
            options: self.options.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SellerConfig {
    pub calculation: PriceCalculation,
    pub deduction: Decimal,
    pub min_price: Decimal,
    pub options: BTreeSet<SellOption>,
    pub lookup_delay_ms: u64,
    pub sell_delay_ms: u64,
}

impl Default for SellerConfig {
    fn default() -> Self {
        Self {
            calculation: PriceCalculation::Fixed,
            deduction: Decimal::ZERO,
            min_price: Decimal::ZERO,
            options: BTreeSet::from([SellOption::AllTradingCards]),
            lookup_delay_ms: 75,
            sell_delay_ms: 125,
        }
    }
}

impl SellerConfig {
    pub fn pricing(&self) -> SalePricing {
        SalePricing {
            calculation: self.calculation,
            deduction: self.deduction,
            min_price: self.min_price,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CleanupConfig {
    pub sanity_ceiling: Decimal,
    pub lookup_delay_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            sanity_ceiling: DEFAULT_SANITY_CEILING,
            lookup_delay_ms: 300,
        }
    }
}

impl CleanupConfig {
    pub fn policy(&self, remove_all: bool) -> CleanupPolicy {
        CleanupPolicy {
            sanity_ceiling: self.sanity_ceiling,
            remove_all,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sweeper.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub dir: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn liquidator_settings(&self) -> LiquidatorSettings {
        LiquidatorSettings {
            listing_page_delay: Duration::from_millis(self.storefront.listing_page_delay_ms),
            cleanup_lookup_delay: Duration::from_millis(self.cleanup.lookup_delay_ms),
            sell_lookup_delay: Duration::from_millis(self.seller.lookup_delay_ms),
            sell_delay: Duration::from_millis(self.seller.sell_delay_ms),
        }
    }
}
