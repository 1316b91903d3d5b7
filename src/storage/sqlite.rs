//! SQLite-backed item and account store.
//!
//! Schema is created on connect. Money is stored as decimal strings so
//! values round-trip exactly.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use super::{AccountStore, ItemStore};
use crate::types::{options_from_mask, options_to_mask, BuyerConfig, CatalogItem, SweeperError};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        price TEXT NOT NULL,
        package_id INTEGER,
        is_bundle INTEGER NOT NULL DEFAULT 0,
        included_items TEXT NOT NULL DEFAULT '[]',
        limited INTEGER NOT NULL DEFAULT 0,
        has_trading_cards INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS items_limited ON items (limited)",
    "CREATE TABLE IF NOT EXISTS accounts (
        account TEXT PRIMARY KEY,
        limit_value TEXT NOT NULL,
        usage TEXT NOT NULL,
        max_price TEXT NOT NULL,
        options_mask INTEGER NOT NULL DEFAULT 0
    )",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url`, e.g.
    /// `sqlite://sweeper.db` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {url}"))?
            .create_if_missing(true);

        // Every in-memory connection is its own database, so keep exactly
        // one alive for the lifetime of the pool.
        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {url}"))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .context("Failed to create schema")?;
        }

        info!(url, "Item store ready");
        Ok(Self { pool })
    }
}

fn storage_err(what: &str) -> impl FnOnce(sqlx::Error) -> SweeperError + '_ {
    move |e| SweeperError::Storage(format!("{what}: {e}"))
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| {
        SweeperError::Storage(format!("bad decimal in column {column}: {raw} ({e})")).into()
    })
}

fn item_from_row(row: &SqliteRow) -> Result<CatalogItem> {
    let included: String = row.try_get("included_items")?;
    Ok(CatalogItem {
        id: row.try_get::<i64, _>("id")? as u64,
        name: row.try_get("name")?,
        price: decimal_column(row, "price")?,
        package_id: row.try_get::<Option<i64>, _>("package_id")?.map(|p| p as u64),
        is_bundle: row.try_get("is_bundle")?,
        included_items: serde_json::from_str(&included)
            .with_context(|| format!("bad included_items: {included}"))?,
        limited: row.try_get("limited")?,
        has_trading_cards: row.try_get("has_trading_cards")?,
    })
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn get(&self, id: u64) -> Result<Option<CatalogItem>> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("get item"))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn upsert(&self, item: &CatalogItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO items (id, name, price, package_id, is_bundle, included_items, limited, has_trading_cards)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                package_id = excluded.package_id,
                is_bundle = excluded.is_bundle,
                included_items = excluded.included_items,
                limited = excluded.limited,
                has_trading_cards = excluded.has_trading_cards",
        )
        .bind(item.id as i64)
        .bind(&item.name)
        .bind(item.price.to_string())
        .bind(item.package_id.map(|p| p as i64))
        .bind(item.is_bundle)
        .bind(serde_json::to_string(&item.included_items)?)
        .bind(item.limited)
        .bind(item.has_trading_cards)
        .execute(&self.pool)
        .await
        .map_err(storage_err("upsert item"))?;

        debug!(item_id = item.id, "Item stored");
        Ok(())
    }

    async fn update_flags(&self, id: u64, limited: bool, has_trading_cards: bool) -> Result<()> {
        sqlx::query("UPDATE items SET limited = ?, has_trading_cards = ? WHERE id = ?")
            .bind(limited)
            .bind(has_trading_cards)
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_err("update flags"))?;
        Ok(())
    }

    async fn list_limited(&self) -> Result<Vec<u64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM items WHERE limited = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("list limited"))?;
        Ok(ids.into_iter().map(|id| id as u64).collect())
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn load_buyer_config(&self, account: &str) -> Result<Option<BuyerConfig>> {
        let Some(row) = sqlx::query("SELECT * FROM accounts WHERE account = ?")
            .bind(account)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("load account"))?
        else {
            return Ok(None);
        };

        let usage: String = row.try_get("usage")?;
        Ok(Some(BuyerConfig {
            mode: usage.parse()?,
            limit: decimal_column(&row, "limit_value")?,
            max_price: decimal_column(&row, "max_price")?,
            options: options_from_mask(row.try_get("options_mask")?),
        }))
    }

    async fn save_buyer_config(&self, account: &str, config: &BuyerConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (account, limit_value, usage, max_price, options_mask)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(account) DO UPDATE SET
                limit_value = excluded.limit_value,
                usage = excluded.usage,
                max_price = excluded.max_price,
                options_mask = excluded.options_mask",
        )
        .bind(account)
        .bind(config.limit.to_string())
        .bind(config.mode.as_str())
        .bind(config.max_price.to_string())
        .bind(options_to_mask(&config.options))
        .execute(&self.pool)
        .await
        .map_err(storage_err("save account"))?;

        info!(account, mode = %config.mode, limit = %config.limit, "Buyer config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuyMode, BuyOption};
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_item_roundtrip() {
        let store = memory_store().await;
        let mut bundle = CatalogItem::sample(555, dec!(10.99));
        bundle.is_bundle = true;
        bundle.included_items = vec![20, 21];
        bundle.package_id = None;

        store.upsert(&bundle).await.unwrap();
        assert_eq!(store.get(555).await.unwrap(), Some(bundle));
        assert!(store.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = memory_store().await;
        store.upsert(&CatalogItem::sample(1, dec!(0.49))).await.unwrap();
        store.upsert(&CatalogItem::sample(1, dec!(0.39))).await.unwrap();

        assert_eq!(store.get(1).await.unwrap().unwrap().price, dec!(0.39));
    }

    #[tokio::test]
    async fn test_update_flags_and_list_limited() {
        let store = memory_store().await;
        for id in [3, 1, 2] {
            store.upsert(&CatalogItem::sample(id, dec!(0.49))).await.unwrap();
        }
        store.update_flags(3, true, false).await.unwrap();
        store.update_flags(1, true, true).await.unwrap();

        assert_eq!(store.list_limited().await.unwrap(), vec![1, 3]);
        let item = store.get(3).await.unwrap().unwrap();
        assert!(item.limited);
        assert!(!item.has_trading_cards);
    }

    #[tokio::test]
    async fn test_buyer_config_roundtrip() {
        let store = memory_store().await;
        let config = BuyerConfig {
            mode: BuyMode::Amount,
            limit: dec!(25),
            max_price: dec!(0.75),
            options: BTreeSet::from([BuyOption::TradingCards, BuyOption::TradingCardsLimited]),
        };

        store.save_buyer_config("alice", &config).await.unwrap();
        assert_eq!(store.load_buyer_config("alice").await.unwrap(), Some(config.clone()));

        let updated = BuyerConfig { mode: BuyMode::Max, options: BTreeSet::new(), ..config };
        store.save_buyer_config("alice", &updated).await.unwrap();
        assert_eq!(store.load_buyer_config("alice").await.unwrap(), Some(updated));
        assert!(store.load_buyer_config("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("items.db").display());

        {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.upsert(&CatalogItem::sample(9, dec!(1.00))).await.unwrap();
        }

        let reopened = SqliteStore::connect(&url).await.unwrap();
        assert_eq!(reopened.get(9).await.unwrap().unwrap().price, dec!(1.00));
    }
}
