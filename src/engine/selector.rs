//! Selection engine.
//!
//! Consumes the crawler stream cheapest-first and admits items into a
//! purchase list until the buyer's mode-specific budget is reached.
//! Returning drops the stream, which stops the crawl.

use std::collections::HashSet;

use futures::{pin_mut, Stream, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::types::{BuyMode, BuyerConfig, CatalogItem, PurchaseList, Wallet};

/// Why an item was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Owned,
    Limited,
    OverMaxPrice,
    AlreadySelected,
    BundleOverlap,
    NoTradingCards,
}

/// Run the admission filters in order; the first failure wins.
pub fn admit(
    item: &CatalogItem,
    buyer: &BuyerConfig,
    owned: &HashSet<u64>,
    list: &PurchaseList,
) -> Result<(), Rejection> {
    let owns_package = item.is_bundle && item.package_id.is_some_and(|p| owned.contains(&p));
    if owned.contains(&item.id) || owns_package {
        return Err(Rejection::Owned);
    }

    if item.limited && !buyer.accepts_limited() {
        return Err(Rejection::Limited);
    }

    if !buyer.max_price.is_zero() && item.price > buyer.max_price {
        return Err(Rejection::OverMaxPrice);
    }

    if list.contains(item.id) {
        return Err(Rejection::AlreadySelected);
    }

    if item.is_bundle
        && item
            .included_items
            .iter()
            .any(|child| owned.contains(child) || list.contains(*child))
    {
        return Err(Rejection::BundleOverlap);
    }

    if buyer.wants_trading_cards() && !item.has_trading_cards {
        return Err(Rejection::NoTradingCards);
    }

    Ok(())
}

/// Adding `item` would break the mode's budget.
pub fn would_exceed(list: &PurchaseList, item: &CatalogItem, buyer: &BuyerConfig, wallet: &Wallet) -> bool {
    match buyer.mode {
        BuyMode::Max => list.total() + item.price > wallet.balance,
        BuyMode::Balance => list.total() + item.price > buyer.limit,
        BuyMode::Amount | BuyMode::Next | BuyMode::Preview => {
            Decimal::from(list.len() + 1) > buyer.limit
        }
    }
}

/// Greedy cheapest-first selection over `items`.
pub async fn select<S>(items: S, buyer: &BuyerConfig, wallet: &Wallet, owned: &HashSet<u64>) -> PurchaseList
where
    S: Stream<Item = CatalogItem>,
{
    pin_mut!(items);
    let mut list = PurchaseList::new();
    let mut seen = 0usize;

    while let Some(item) = items.next().await {
        seen += 1;

        if let Err(reason) = admit(&item, buyer, owned, &list) {
            debug!(item_id = item.id, ?reason, "Item rejected");
            continue;
        }

        if would_exceed(&list, &item, buyer, wallet) {
            info!(
                item_id = item.id,
                price = %item.price,
                mode = %buyer.mode,
                "Budget reached, stopping selection"
            );
            break;
        }

        debug!(item = %item, "Item selected");
        list.push(item);
    }

    info!(
        seen,
        selected = list.len(),
        total = %list.total(),
        "Selection finished"
    );
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuyOption;
    use futures::stream;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn buyer(mode: BuyMode, limit: Decimal) -> BuyerConfig {
        BuyerConfig {
            mode,
            limit,
            max_price: Decimal::ZERO,
            options: BTreeSet::new(),
        }
    }

    fn wallet(balance: Decimal) -> Wallet {
        Wallet {
            currency: "EUR".into(),
            balance,
            has_wallet: true,
        }
    }

    fn items(prices: &[Decimal]) -> Vec<CatalogItem> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| CatalogItem::sample(i as u64 + 1, *p))
            .collect()
    }

    #[tokio::test]
    async fn test_amount_mode_includes_boundary_item() {
        let all = items(&[dec!(0.1), dec!(0.2), dec!(0.3), dec!(0.4)]);
        let list = select(stream::iter(all), &buyer(BuyMode::Amount, dec!(3)), &wallet(dec!(100)), &HashSet::new()).await;

        assert_eq!(list.len(), 3);
        assert_eq!(list.total(), dec!(0.6));
    }

    #[tokio::test]
    async fn test_balance_mode_stops_before_overspend() {
        let all = items(&[dec!(0.5), dec!(0.5), dec!(0.7), dec!(0.1)]);
        let config = buyer(BuyMode::Balance, dec!(1.5));
        let list = select(stream::iter(all.clone()), &config, &wallet(dec!(10)), &HashSet::new()).await;

        assert_eq!(list.len(), 2);
        assert!(list.total() <= config.limit);
        assert!(list.total() + all[2].price > config.limit);
    }

    #[tokio::test]
    async fn test_max_mode_uses_wallet_balance() {
        let all = items(&[dec!(1), dec!(1), dec!(1)]);
        let list = select(stream::iter(all), &buyer(BuyMode::Max, Decimal::ZERO), &wallet(dec!(2.5)), &HashSet::new()).await;
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn test_selection_stops_consuming_stream() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let source = stream::iter(items(&[dec!(0.1); 10])).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let list = select(source, &buyer(BuyMode::Amount, dec!(2)), &wallet(dec!(100)), &HashSet::new()).await;
        assert_eq!(list.len(), 2);
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_admission_filter_order() {
        let mut config = buyer(BuyMode::Amount, dec!(10));
        config.max_price = dec!(1);
        config.options = BTreeSet::from([BuyOption::TradingCards]);
        let owned = HashSet::from([1]);
        let mut list = PurchaseList::new();

        // Owned wins over every later filter.
        let mut item = CatalogItem::sample(1, dec!(5));
        item.limited = true;
        assert_eq!(admit(&item, &config, &owned, &list), Err(Rejection::Owned));

        let mut limited = CatalogItem::sample(2, dec!(5));
        limited.limited = true;
        assert_eq!(admit(&limited, &config, &owned, &list), Err(Rejection::Limited));

        assert_eq!(
            admit(&CatalogItem::sample(3, dec!(5)), &config, &owned, &list),
            Err(Rejection::OverMaxPrice)
        );

        list.push(CatalogItem::sample(4, dec!(0.5)));
        assert_eq!(
            admit(&CatalogItem::sample(4, dec!(0.5)), &config, &owned, &list),
            Err(Rejection::AlreadySelected)
        );

        let mut bundle = CatalogItem::sample(50, dec!(0.9));
        bundle.is_bundle = true;
        bundle.included_items = vec![4, 6];
        assert_eq!(admit(&bundle, &config, &owned, &list), Err(Rejection::BundleOverlap));

        let mut no_cards = CatalogItem::sample(7, dec!(0.5));
        no_cards.has_trading_cards = false;
        assert_eq!(admit(&no_cards, &config, &owned, &list), Err(Rejection::NoTradingCards));

        assert_eq!(admit(&CatalogItem::sample(8, dec!(0.5)), &config, &owned, &list), Ok(()));
    }

    #[test]
    fn test_limited_accepted_with_option() {
        let mut config = buyer(BuyMode::Amount, dec!(1));
        config.options = BTreeSet::from([BuyOption::TradingCardsLimited]);
        let mut item = CatalogItem::sample(2, dec!(0.5));
        item.limited = true;

        assert_eq!(admit(&item, &config, &HashSet::new(), &PurchaseList::new()), Ok(()));
    }

    #[test]
    fn test_owned_bundle_package() {
        let mut bundle = CatalogItem::sample(50, dec!(0.9));
        bundle.is_bundle = true;
        bundle.package_id = Some(900);
        let owned = HashSet::from([900]);

        assert_eq!(
            admit(&bundle, &buyer(BuyMode::Amount, dec!(1)), &owned, &PurchaseList::new()),
            Err(Rejection::Owned)
        );
    }
}
