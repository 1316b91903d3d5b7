//! `reqwest`-backed `RemoteClient`.
//!
//! Non-2xx responses and transport failures both map to `None`. HTTP 429
//! is expected while crawling and only logged at debug level.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use super::RemoteClient;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct HttpClient {
    http: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build storefront HTTP client")?;

        Ok(Self { http })
    }

    fn with_headers(mut req: RequestBuilder, headers: &[(String, String)]) -> RequestBuilder {
        for (name, value) in headers {
            req = req.header(name, value);
        }
        req
    }

    async fn send(&self, method: &str, url: &str, req: RequestBuilder) -> Option<String> {
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(method, url, error = %e, "Request failed");
                return None;
            }
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            debug!(method, url, "Rate limited");
            return None;
        }
        if !status.is_success() {
            warn!(method, url, status = %status, "Request returned error status");
            return None;
        }

        match resp.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(method, url, error = %e, "Failed to read response body");
                None
            }
        }
    }
}

#[async_trait]
impl RemoteClient for HttpClient {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Option<String> {
        let req = Self::with_headers(self.http.get(url), headers);
        self.send("GET", url, req).await
    }

    async fn post(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(String, String)],
    ) -> Option<String> {
        let req = Self::with_headers(self.http.post(url).form(form), headers);
        self.send("POST", url, req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        assert!(HttpClient::new().is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_none() {
        let client = HttpClient::new().unwrap();
        let body = client.get("http://127.0.0.1:9/unreachable", &[]).await;
        assert!(body.is_none());
    }
}
