//! Remote platform access.
//!
//! Defines the `RemoteClient` trait every component issues requests
//! through, the per-run `Session`, and the endpoint wrappers for:
//! - store - catalog search, detail pages, age gate, account queries
//! - cart - account cart and checkout transaction endpoints
//! - market - price lookups, own listings, inventory, selling

pub mod cart;
pub mod http;
pub mod market;
pub mod parse;
pub mod session;
pub mod store;

use async_trait::async_trait;

pub use session::Session;

/// Header or form pairs, sent in order.
pub type Pairs = Vec<(String, String)>;

/// Build a `Pairs` list from string literals.
pub fn pairs<const N: usize>(items: [(&str, &str); N]) -> Pairs {
    items
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Transport used against the storefront, checkout and market hosts.
///
/// Both calls return the response body, or `None` on any transport or
/// HTTP failure. They never fail loudly: callers log and skip.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Option<String>;

    async fn post(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(String, String)],
    ) -> Option<String>;
}
