//! Checkout pipeline.
//!
//! Drives one purchase list through the platform's account cart:
//!
//! ```text
//! Empty -> Staged -> Initialized -> Priced -> Finalized
//!                        ^   |
//!                        |   v
//!                     Repairing
//! ```
//!
//! Staging failures are logged and skipped. An item-level rejection at
//! initialisation removes that item's cart line and restarts
//! initialisation from a fresh attempt budget; repairs are capped at the
//! number of staged items. Raw bodies of failed checkout calls go to the
//! debug sink.

use std::fmt;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::platforms::cart::{self, CartLine, InitOutcome, FINALIZE_SUCCESS};
use crate::platforms::{RemoteClient, Session};
use crate::storage::DebugSink;
use crate::types::{CatalogItem, PurchaseList, SweeperError};

/// Attempts per retried step (initialise, price, finalize).
pub const STEP_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Empty,
    Staged,
    Initialized,
    Repairing,
    Priced,
    Finalized,
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckoutState::Empty => "empty",
            CheckoutState::Staged => "staged",
            CheckoutState::Initialized => "initialized",
            CheckoutState::Repairing => "repairing",
            CheckoutState::Priced => "priced",
            CheckoutState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// An item accepted into the remote cart.
#[derive(Debug, Clone)]
struct StagedItem {
    item: CatalogItem,
    line_item_ids: Vec<String>,
}

/// Result of a finalized checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub transaction_id: String,
    /// Ids of the items that were paid for.
    pub purchased: Vec<u64>,
    /// Ids removed from the cart during repair.
    pub removed: Vec<u64>,
    /// Platform-formatted account total, when the price query answered.
    pub final_total: Option<String>,
}

/// Name of the item the platform blames in `error_text`.
///
/// The platform quotes the item name; when it does not, the longest staged
/// name contained in the text is taken.
fn identify_rejected(error_text: &str, names: &[&str]) -> Option<usize> {
    let quoted = error_text.split('"').nth(1).filter(|q| !q.is_empty());
    if let Some(quoted) = quoted {
        if let Some(idx) = names.iter().position(|n| n.eq_ignore_ascii_case(quoted)) {
            return Some(idx);
        }
    }

    let haystack = error_text.to_lowercase();
    names
        .iter()
        .enumerate()
        .filter(|(_, n)| !n.is_empty() && haystack.contains(&n.to_lowercase()))
        .max_by_key(|(_, n)| n.len())
        .map(|(idx, _)| idx)
}

pub struct CheckoutPipeline<'a> {
    client: &'a dyn RemoteClient,
    session: &'a Session,
    sink: &'a DebugSink,
    attempts: u32,
    state: CheckoutState,
}

impl<'a> CheckoutPipeline<'a> {
    pub fn new(client: &'a dyn RemoteClient, session: &'a Session, sink: &'a DebugSink) -> Self {
        Self {
            client,
            session,
            sink,
            attempts: STEP_ATTEMPTS,
            state: CheckoutState::Empty,
        }
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    fn transition(&mut self, next: CheckoutState) {
        debug!(from = %self.state, to = %next, "Checkout state change");
        self.state = next;
    }

    /// Stage, initialise (repairing as needed), price and finalize.
    pub async fn run(&mut self, list: &PurchaseList) -> Result<CheckoutReceipt> {
        let mut staged = self.stage(list).await?;
        let mut removed = Vec::new();

        let transaction_id = self.initialize(&mut staged, &mut removed).await?;
        let final_total = self.price(&transaction_id).await;
        self.finalize(&transaction_id).await?;

        let purchased: Vec<u64> = staged.iter().map(|s| s.item.id).collect();
        info!(
            transaction_id = %transaction_id,
            purchased = purchased.len(),
            removed = removed.len(),
            total = ?final_total,
            "Checkout complete"
        );

        Ok(CheckoutReceipt {
            transaction_id,
            purchased,
            removed,
            final_total,
        })
    }

    // -- Stage -------------------------------------------------------------

    async fn stage(&mut self, list: &PurchaseList) -> Result<Vec<StagedItem>> {
        cart::delete_cart(self.client, self.session).await;

        let mut staged = Vec::with_capacity(list.len());
        for item in list.iter() {
            let Some(package_id) = item.package_id else {
                warn!(item_id = item.id, name = %item.name, "No package id, item not staged");
                continue;
            };

            let line_item_ids = cart::add_to_cart(self.client, self.session, package_id).await;
            if line_item_ids.is_empty() {
                warn!(item_id = item.id, package_id, name = %item.name, "Cart rejected item");
                continue;
            }

            debug!(item_id = item.id, package_id, "Item staged");
            staged.push(StagedItem {
                item: item.clone(),
                line_item_ids,
            });
        }

        if staged.is_empty() {
            return Err(SweeperError::PlatformRejected {
                step: "stage".into(),
                message: format!("none of {} items could be added to the cart", list.len()),
            }
            .into());
        }

        info!(staged = staged.len(), requested = list.len(), "Cart staged");
        self.transition(CheckoutState::Staged);
        Ok(staged)
    }

    // -- Initialize & repair ---------------------------------------------

    async fn initialize(&mut self, staged: &mut Vec<StagedItem>, removed: &mut Vec<u64>) -> Result<String> {
        let repair_limit = staged.len();
        let mut repairs = 0usize;
        let mut failures = 0u32;

        loop {
            let reply = cart::init_transaction(self.client, self.session).await;
            if !matches!(reply.outcome, InitOutcome::Started { .. }) {
                if let Some(body) = &reply.body {
                    self.sink.write_timestamped("init_transaction_error", body);
                }
            }

            match reply.outcome {
                InitOutcome::Started { transaction_id } => {
                    info!(transaction_id = %transaction_id, "Transaction initialised");
                    self.transition(CheckoutState::Initialized);
                    return Ok(transaction_id);
                }
                InitOutcome::ItemRejected { error_text } => {
                    if repairs >= repair_limit {
                        error!(repairs, "Cart repair limit reached");
                        return Err(SweeperError::RepairLimitExceeded { limit: repair_limit }.into());
                    }
                    repairs += 1;
                    self.transition(CheckoutState::Repairing);
                    if let Some(id) = self.repair(&error_text, staged).await? {
                        removed.push(id);
                        failures = 0;
                    }

                    if staged.is_empty() {
                        return Err(SweeperError::PlatformRejected {
                            step: "inittransaction".into(),
                            message: "every staged item was rejected".into(),
                        }
                        .into());
                    }
                }
                InitOutcome::Failed => {
                    failures += 1;
                    warn!(attempt = failures, "Transaction initialisation failed");
                    if failures >= self.attempts {
                        return Err(SweeperError::PlatformRejected {
                            step: "inittransaction".into(),
                            message: format!("no transaction after {failures} attempts"),
                        }
                        .into());
                    }
                }
            }
        }
    }

    /// Remove the cart lines of the item named in `error_text`. Returns the
    /// removed item's id, or `None` when its lines could not be deleted and
    /// the item is still in the cart.
    async fn repair(&mut self, error_text: &str, staged: &mut Vec<StagedItem>) -> Result<Option<u64>> {
        let names: Vec<&str> = staged.iter().map(|s| s.item.name.as_str()).collect();
        let Some(idx) = identify_rejected(error_text, &names) else {
            error!(error_text, "Cannot tell which cart item was rejected");
            return Err(SweeperError::PlatformRejected {
                step: "inittransaction".into(),
                message: error_text.to_string(),
            }
            .into());
        };
        let rejected = &staged[idx];
        warn!(item_id = rejected.item.id, name = %rejected.item.name, error_text, "Removing rejected item from cart");

        let lines = cart::get_cart(self.client, self.session).await.unwrap_or_default();
        let mut deleted = 0usize;
        for line_item_id in Self::lines_for(rejected, &lines) {
            if cart::delete_line_item(self.client, self.session, &line_item_id).await {
                deleted += 1;
            } else {
                warn!(line_item_id = %line_item_id, "Failed to delete cart line");
            }
        }

        if deleted == 0 {
            return Ok(None);
        }
        Ok(Some(staged.remove(idx).item.id))
    }

    /// Cart lines belonging to `staged`: matched by package id, or the
    /// line ids returned at staging when the cart listing has none.
    fn lines_for(staged: &StagedItem, lines: &[CartLine]) -> Vec<String> {
        let matched: Vec<String> = lines
            .iter()
            .filter(|l| l.package_id.is_some() && l.package_id == staged.item.package_id)
            .map(|l| l.line_item_id.clone())
            .collect();
        if matched.is_empty() {
            staged.line_item_ids.clone()
        } else {
            matched
        }
    }

    // -- Price & finalize --------------------------------------------------

    /// Informational only; the pipeline proceeds even when every query
    /// fails.
    async fn price(&mut self, transaction_id: &str) -> Option<String> {
        for attempt in 1..=self.attempts {
            if let Some(total) = cart::final_price(self.client, self.session, transaction_id).await {
                info!(transaction_id, total = %total, "Final price");
                self.transition(CheckoutState::Priced);
                return Some(total);
            }
            warn!(transaction_id, attempt, "Final price query failed");
        }
        self.transition(CheckoutState::Priced);
        None
    }

    async fn finalize(&mut self, transaction_id: &str) -> Result<()> {
        let mut last_body = None;
        for attempt in 1..=self.attempts {
            let reply = cart::finalize_transaction(self.client, self.session, transaction_id).await;
            match reply.outcome {
                Some(FINALIZE_SUCCESS) => {
                    self.transition(CheckoutState::Finalized);
                    return Ok(());
                }
                status => warn!(transaction_id, attempt, ?status, "Finalize attempt failed"),
            }
            last_body = reply.body.or(last_body);
        }

        error!(transaction_id, "Transaction could not be finalized");
        if let Some(body) = &last_body {
            self.sink.write("finalize_transaction_error", transaction_id, body);
        }
        Err(SweeperError::FinalizeFailed {
            transaction_id: transaction_id.to_string(),
            attempts: self.attempts,
        }
        .into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
