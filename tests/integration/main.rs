//! Integration tests driving the buy and liquidation pipelines through
//! an in-memory storefront.

mod buy_pipeline;
mod fake_storefront;
mod liquidation;
