//! Crawl → select → checkout against the fake storefront.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use sweeper::engine::selector;
use sweeper::engine::{CheckoutPipeline, CrawlRequest, Crawler, CrawlerSettings};
use sweeper::platforms::store;
use sweeper::storage::{DebugSink, ItemStore, MemoryStore, SqliteStore};
use sweeper::types::{BuyMode, BuyOption, BuyerConfig, CatalogItem, PurchaseList, Wallet};

use crate::fake_storefront::{reject_body, FakeItem, FakeStorefront};

fn settings(page_size: u64) -> CrawlerSettings {
    CrawlerSettings {
        page_size,
        page_delay: Duration::ZERO,
        item_delay: Duration::ZERO,
    }
}

fn wallet(balance: Decimal) -> Wallet {
    Wallet {
        currency: "EUR".into(),
        balance,
        has_wallet: true,
    }
}

fn buyer(mode: BuyMode, limit: Decimal, max_price: Decimal) -> BuyerConfig {
    BuyerConfig {
        mode,
        limit,
        max_price,
        options: BTreeSet::new(),
    }
}

/// Run crawl + selection once over `fake`.
async fn select_from(
    fake: &FakeStorefront,
    store: &dyn ItemStore,
    page_size: u64,
    buyer: &BuyerConfig,
    wallet: &Wallet,
) -> PurchaseList {
    let session = FakeStorefront::session();
    let sink = DebugSink::disabled();
    let owned = store::fetch_owned_ids(fake, &session).await.unwrap();
    let limited: HashSet<u64> = store.list_limited().await.unwrap().into_iter().collect();

    let crawler = Crawler::new(fake, &session, store, &sink, settings(page_size));
    let request = CrawlRequest {
        buyer,
        wallet,
        owned: &owned,
        limited: &limited,
        start: 0,
    };
    selector::select(crawler.crawl(request), buyer, wallet, &owned).await
}

#[tokio::test]
async fn test_over_budget_page_stops_crawl() {
    // Page one: ten cheap items. Page two: four cheap, six above max price.
    let mut catalog: Vec<FakeItem> = (1..=10).map(|id| FakeItem::new(id, 10 * id as i64)).collect();
    catalog.extend((11..=14).map(|id| FakeItem::new(id, 400)));
    catalog.extend((15..=20).map(|id| FakeItem::new(id, 600)));
    let fake = FakeStorefront::new(catalog);
    let store = MemoryStore::new();

    let config = buyer(BuyMode::Amount, dec!(100), dec!(5));
    let list = select_from(&fake, &store, 10, &config, &wallet(dec!(1000))).await;

    assert_eq!(list.len(), 10);
    assert!(list.iter().all(|i| i.price <= dec!(1)));
    assert_eq!(fake.calls("search"), 2);
    // The over-budget page is never classified.
    assert_eq!(fake.calls("detail"), 10);
}

#[tokio::test]
async fn test_classification_cache_avoids_refetch() {
    let fake = FakeStorefront::new((1..=5).map(|id| FakeItem::new(id, 25)).collect());
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    let config = buyer(BuyMode::Amount, dec!(5), Decimal::ZERO);

    let first = select_from(&fake, &store, 100, &config, &wallet(dec!(10))).await;
    assert_eq!(first.len(), 5);
    assert_eq!(fake.calls("detail"), 5);

    let second = select_from(&fake, &store, 100, &config, &wallet(dec!(10))).await;
    assert_eq!(second.items(), first.items());
    assert_eq!(fake.calls("detail"), 5);

    let stored = store.get(3).await.unwrap().unwrap();
    assert_eq!(stored.package_id, Some(1003));
    assert!(stored.has_trading_cards);
}

#[tokio::test]
async fn test_balance_mode_spends_at_most_limit() {
    let catalog: Vec<FakeItem> = (1..=30).map(|id| FakeItem::new(id, 7 * id as i64)).collect();
    let prices: Vec<Decimal> = catalog.iter().map(|i| Decimal::new(i.price_cents, 2)).collect();
    let fake = FakeStorefront::new(catalog);

    for limit in [dec!(0.50), dec!(1.00), dec!(3.33), dec!(10)] {
        let store = MemoryStore::new();
        let config = buyer(BuyMode::Balance, limit, Decimal::ZERO);
        let list = select_from(&fake, &store, 10, &config, &wallet(dec!(100))).await;

        assert!(list.total() <= limit, "limit {limit}: spent {}", list.total());
        let next = prices[list.len()];
        assert!(list.total() + next > limit, "limit {limit}: next item {next} would still fit");
    }
}

#[tokio::test]
async fn test_amount_mode_never_exceeds_count() {
    let fake = FakeStorefront::new((1..=25).map(|id| FakeItem::new(id, 5 * id as i64)).collect());

    for n in [1u32, 7, 12] {
        let store = MemoryStore::new();
        let config = buyer(BuyMode::Amount, Decimal::from(n), Decimal::ZERO);
        let list = select_from(&fake, &store, 10, &config, &wallet(dec!(100))).await;
        assert_eq!(list.len(), n as usize);
    }
}

#[tokio::test]
async fn test_filters_owned_limited_and_cardless() {
    let mut limited = FakeItem::new(2, 20);
    limited.limited = true;
    let mut cardless = FakeItem::new(3, 30);
    cardless.has_trading_cards = false;
    let fake = FakeStorefront::new(vec![FakeItem::new(1, 10), limited, cardless, FakeItem::new(4, 40)])
        .with_owned(vec![1]);
    let store = MemoryStore::new();

    let mut config = buyer(BuyMode::Amount, dec!(10), Decimal::ZERO);
    config.options = BTreeSet::from([BuyOption::TradingCards]);
    let list = select_from(&fake, &store, 100, &config, &wallet(dec!(100))).await;

    let ids: Vec<u64> = list.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![4]);
    // Owned rows are never fetched.
    assert_eq!(fake.calls("detail"), 3);
    assert_eq!(store.list_limited().await.unwrap(), vec![2]);
}

fn catalog_item(id: u64, price: Decimal) -> CatalogItem {
    CatalogItem {
        id,
        name: format!("Game {id}"),
        price,
        package_id: Some(id + 1000),
        is_bundle: false,
        included_items: Vec::new(),
        limited: false,
        has_trading_cards: true,
    }
}

#[tokio::test]
async fn test_checkout_repairs_rejected_item() {
    let fake = FakeStorefront::new(Vec::new());
    fake.script_init(vec![reject_body("Game 2")]);
    let session = FakeStorefront::session();

    let mut list = PurchaseList::new();
    for id in 1..=3 {
        list.push(catalog_item(id, dec!(0.49)));
    }

    let dir = tempfile::tempdir().unwrap();
    let sink = DebugSink::new(dir.path());
    let receipt = CheckoutPipeline::new(&fake, &session, &sink).run(&list).await.unwrap();

    assert_eq!(fake.calls("inittransaction"), 2);
    let dumps: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| std::fs::read_to_string(e.unwrap().path()).unwrap())
        .collect();
    assert_eq!(dumps.len(), 1);
    assert!(dumps[0].contains("Game 2"));
    assert_eq!(fake.deleted_lines(), vec!["L1002".to_string()]);
    assert_eq!(receipt.removed, vec![2]);
    assert_eq!(receipt.purchased, vec![1, 3]);
    assert_eq!(receipt.final_total.as_deref(), Some("1,47€"));
    assert_eq!(fake.calls("finalizetransaction"), 1);
}

#[tokio::test]
async fn test_full_buy_run() {
    let fake = FakeStorefront::new((1..=8).map(|id| FakeItem::new(id, 15 * id as i64)).collect());
    let store = MemoryStore::new();
    let config = buyer(BuyMode::Max, Decimal::ZERO, Decimal::ZERO);

    let list = select_from(&fake, &store, 4, &config, &wallet(dec!(1.00))).await;
    // 0.15 + 0.30 + 0.45 = 0.90, the next item would overdraw the wallet.
    assert_eq!(list.len(), 3);

    let session = FakeStorefront::session();
    let sink = DebugSink::disabled();
    let receipt = CheckoutPipeline::new(&fake, &session, &sink).run(&list).await.unwrap();
    assert_eq!(receipt.purchased, vec![1, 2, 3]);
    assert_eq!(fake.calls("AddItemsToCart"), 3);
    assert_eq!(fake.calls("DeleteCart"), 1);
}
