//! Core engine: crawl → select → checkout on the buy side, price →
//! decide → remove/list on the liquidation side.

pub mod checkout;
pub mod crawler;
pub mod liquidator;
pub mod pricer;
pub mod selector;

pub use checkout::{CheckoutPipeline, CheckoutReceipt};
pub use crawler::{CrawlRequest, Crawler, CrawlerSettings};
pub use liquidator::{LiquidationReport, Liquidator, LiquidatorSettings, SaleReport};
pub use pricer::MarketPricer;
