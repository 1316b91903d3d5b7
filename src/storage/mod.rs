//! Persistence layer.
//!
//! Two stores sit behind narrow async traits:
//! - `ItemStore` - classified catalog items keyed by id
//! - `AccountStore` - the buyer configuration saved per account
//!
//! `SqliteStore` backs both with SQLite; `MemoryStore` has identical
//! semantics and is used by tests and dry runs.

pub mod debug;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::types::{BuyerConfig, CatalogItem};

pub use debug::DebugSink;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get(&self, id: u64) -> Result<Option<CatalogItem>>;

    /// Insert or fully replace the record for `item.id`.
    async fn upsert(&self, item: &CatalogItem) -> Result<()>;

    /// Overwrite only the classification flags of an existing record.
    async fn update_flags(&self, id: u64, limited: bool, has_trading_cards: bool) -> Result<()>;

    /// Ids of every record flagged as limited.
    async fn list_limited(&self) -> Result<Vec<u64>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load_buyer_config(&self, account: &str) -> Result<Option<BuyerConfig>>;

    async fn save_buyer_config(&self, account: &str, config: &BuyerConfig) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Per-id serialisation
// ---------------------------------------------------------------------------

/// Async locks keyed by record id. Holding the guard serialises
/// read-classify-write sequences for one id.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: std::sync::Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: u64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<u64, CatalogItem>>,
    accounts: RwLock<HashMap<String, BuyerConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get(&self, id: u64) -> Result<Option<CatalogItem>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn upsert(&self, item: &CatalogItem) -> Result<()> {
        self.items.write().await.insert(item.id, item.clone());
        Ok(())
    }

    async fn update_flags(&self, id: u64, limited: bool, has_trading_cards: bool) -> Result<()> {
        if let Some(item) = self.items.write().await.get_mut(&id) {
            item.limited = limited;
            item.has_trading_cards = has_trading_cards;
        }
        Ok(())
    }

    async fn list_limited(&self) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = self
            .items
            .read()
            .await
            .values()
            .filter(|i| i.limited)
            .map(|i| i.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn load_buyer_config(&self, account: &str) -> Result<Option<BuyerConfig>> {
        Ok(self.accounts.read().await.get(account).cloned())
    }

    async fn save_buyer_config(&self, account: &str, config: &BuyerConfig) -> Result<()> {
        self.accounts.write().await.insert(account.to_string(), config.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
