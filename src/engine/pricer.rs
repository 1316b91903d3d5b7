//! Market price lookups with a per-run cache.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::debug;

use crate::platforms::market;
use crate::platforms::{RemoteClient, Session};

pub struct MarketPricer<'a> {
    client: &'a dyn RemoteClient,
    session: &'a Session,
    currency_id: u32,
    /// Pause after every lookup that reached the network.
    lookup_delay: Duration,
    cache: HashMap<String, Decimal>,
}

impl<'a> MarketPricer<'a> {
    pub fn new(client: &'a dyn RemoteClient, session: &'a Session, currency_id: u32, lookup_delay: Duration) -> Self {
        Self {
            client,
            session,
            currency_id,
            lookup_delay,
            cache: HashMap::new(),
        }
    }

    /// Current lowest price for an item type, `None` when neither endpoint
    /// yields one. Misses are not cached so a later call may retry.
    pub async fn price(&mut self, app_id: u64, hash_name: &str) -> Option<Decimal> {
        let key = market::fix_hash_name(hash_name);
        if let Some(price) = self.cache.get(&key) {
            return Some(*price);
        }

        let found = match market::price_overview(self.client, self.session, app_id, &key, self.currency_id).await {
            Some(price) => Some(price),
            None => {
                debug!(hash_name = %key, "No price overview, trying multibuy");
                market::multibuy_price(self.client, self.session, app_id, &key).await
            }
        };
        tokio::time::sleep(self.lookup_delay).await;

        match found {
            Some(price) => {
                debug!(hash_name = %key, price = %price, "Market price");
                self.cache.insert(key, price);
            }
            None => debug!(hash_name = %key, "No market price found"),
        }
        found
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
