//! SWEEPER: budgeted catalog acquisition and market liquidation agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the session from the environment and runs one pipeline:
//!
//! ```text
//! sweeper [buy|sell|cleanup|clean-all] [config.toml]
//! ```

use std::collections::HashSet;
use std::str::FromStr;

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use sweeper::config::{self, AppConfig};
use sweeper::engine::selector;
use sweeper::engine::{CheckoutPipeline, CrawlRequest, Crawler, Liquidator};
use sweeper::platforms::http::HttpClient;
use sweeper::platforms::{store, RemoteClient, Session};
use sweeper::storage::{AccountStore, DebugSink, ItemStore, SqliteStore};
use sweeper::strategy::currency::{format_currency_string, platform_currency_id};
use sweeper::types::{items_to_badge, next_badge, BuyMode, SweeperError, Wallet};

const BANNER: &str = r#"
 ____  _    _ _____ _____ ____  _____ ____
/ ___|| |  | | ____| ____|  _ \| ____|  _ \
\___ \| |/\| |  _| |  _| | |_) |  _| | |_) |
 ___) |  /\  | |___| |___|  __/| |___|  _ <
|____/|_/  \_|_____|_____|_|   |_____|_| \_\

  Budgeted catalog acquisition & market liquidation
  v0.1.0
"#;

/// Currency id used when the wallet currency is not in the table.
const FALLBACK_CURRENCY_ID: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Buy,
    Sell,
    Cleanup,
    CleanAll,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buy" => Ok(Command::Buy),
            "sell" => Ok(Command::Sell),
            "cleanup" => Ok(Command::Cleanup),
            "clean-all" => Ok(Command::CleanAll),
            other => bail!("Unknown command: {other} (expected buy, sell, cleanup or clean-all)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let mut args = std::env::args().skip(1);
    let command: Command = args.next().as_deref().unwrap_or("buy").parse()?;
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());

    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        account = %cfg.agent.account,
        command = ?command,
        "SWEEPER starting up"
    );

    let session = Session::from_env(&cfg.agent.session)?;
    let client = HttpClient::new()?;

    let span = info_span!("run", run_id = %Uuid::new_v4());
    async {
        match command {
            Command::Buy => run_buy(&cfg, &client, &session).await,
            Command::Sell => run_sell(&cfg, &client, &session).await,
            Command::Cleanup => run_cleanup(&cfg, &client, &session, false).await,
            Command::CleanAll => run_cleanup(&cfg, &client, &session, true).await,
        }
    }
    .instrument(span)
    .await
}

fn currency_id(wallet: &Wallet) -> u32 {
    platform_currency_id(&wallet.currency).unwrap_or_else(|| {
        warn!(currency = %wallet.currency, "Unknown wallet currency, pricing in USD");
        FALLBACK_CURRENCY_ID
    })
}

fn debug_sink(cfg: &AppConfig) -> DebugSink {
    if cfg.debug.enabled {
        DebugSink::new(cfg.debug.dir.as_deref().unwrap_or("debug"))
    } else {
        DebugSink::disabled()
    }
}

// ---------------------------------------------------------------------------
// Buy
// ---------------------------------------------------------------------------

async fn run_buy(cfg: &AppConfig, client: &dyn RemoteClient, session: &Session) -> Result<()> {
    let db = SqliteStore::connect(&cfg.storage.database_url).await?;

    let wallet = store::fetch_wallet(client, session).await?;
    if !wallet.has_wallet {
        return Err(SweeperError::Policy("account has no wallet balance".into()).into());
    }
    let owned = store::fetch_owned_ids(client, session).await?;
    info!(wallet = %wallet, owned = owned.len(), "Account loaded");

    let (mut buyer, persist, badge) = match &cfg.buyer {
        Some(section) => (section.buyer_config(), section.persist, section.badge),
        None => {
            let saved = db.load_buyer_config(&cfg.agent.account).await?.ok_or_else(|| {
                SweeperError::Policy(format!(
                    "no [buyer] section and no saved configuration for {}",
                    cfg.agent.account
                ))
            })?;
            info!(account = %cfg.agent.account, mode = %saved.mode, "Using saved buyer configuration");
            (saved, false, None)
        }
    };
    let chosen = buyer.clone();

    if matches!(buyer.mode, BuyMode::Next | BuyMode::Preview) {
        let owned_apps = store::fetch_owned_app_count(client, session).await?;
        let target = match (buyer.mode, badge) {
            (BuyMode::Preview, Some(badge)) => Some(badge),
            _ => next_badge(owned_apps),
        };
        let Some(target) = target else {
            bail!(SweeperError::Policy(format!("no badge above {owned_apps} owned apps")));
        };
        buyer.limit = Decimal::from(items_to_badge(owned_apps, target));
        info!(owned_apps, badge = target, items = %buyer.limit, "Badge target");
    }

    buyer.validate(&wallet)?;

    if persist && chosen.mode != BuyMode::Preview {
        db.save_buyer_config(&cfg.agent.account, &chosen).await?;
    }

    let limited: HashSet<u64> = db.list_limited().await?.into_iter().collect();
    let sink = debug_sink(cfg);
    let crawler = Crawler::new(client, session, &db, &sink, cfg.storefront.crawler_settings());
    let request = CrawlRequest {
        buyer: &buyer,
        wallet: &wallet,
        owned: &owned,
        limited: &limited,
        start: 0,
    };

    let list = selector::select(crawler.crawl(request), &buyer, &wallet, &owned).await;

    println!(
        "Selected {} items, total {}, average {}",
        list.len(),
        format_currency_string(&wallet.currency, list.total()),
        format_currency_string(&wallet.currency, list.average()),
    );

    if buyer.mode == BuyMode::Preview {
        info!("Preview only, nothing bought");
        return Ok(());
    }
    if list.is_empty() {
        info!("Nothing to buy");
        return Ok(());
    }

    let receipt = CheckoutPipeline::new(client, session, &sink).run(&list).await?;
    println!(
        "Purchased {} items (transaction {}), total {}",
        receipt.purchased.len(),
        receipt.transaction_id,
        receipt.final_total.as_deref().unwrap_or("unknown"),
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Sell & cleanup
// ---------------------------------------------------------------------------

async fn run_sell(cfg: &AppConfig, client: &dyn RemoteClient, session: &Session) -> Result<()> {
    let wallet = store::fetch_wallet(client, session).await?;
    let liquidator = Liquidator::new(client, session, currency_id(&wallet), cfg.liquidator_settings());

    let report = liquidator.sell(&cfg.seller.pricing(), &cfg.seller.options).await?;
    println!(
        "Listed {} items for {} minor units ({} failed, {} without price)",
        report.listed, report.total_minor, report.failed, report.skipped
    );
    Ok(())
}

async fn run_cleanup(cfg: &AppConfig, client: &dyn RemoteClient, session: &Session, remove_all: bool) -> Result<()> {
    let wallet = store::fetch_wallet(client, session).await?;
    let liquidator = Liquidator::new(client, session, currency_id(&wallet), cfg.liquidator_settings());

    let report = liquidator.cleanup(&cfg.cleanup.policy(remove_all)).await;
    println!(
        "Checked {} listings, removed {} (net {}), kept net {}",
        report.checked,
        report.removed,
        format_currency_string(&wallet.currency, report.removed_value),
        format_currency_string(&wallet.currency, report.retained_value),
    );
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sweeper=info"));

    let json_logging = std::env::var("SWEEPER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
