//! Authenticated web session for one run.
//!
//! Establishing the session (login, token refresh) happens elsewhere; the
//! agent receives the resulting identifiers through the environment and
//! passes the `Session` by reference to every component that talks to the
//! platform.

use anyhow::Result;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::Pairs;
use crate::types::SweeperError;

/// Environment variable names the session is read from.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionEnv {
    pub session_id_env: String,
    pub access_token_env: String,
    pub steam_id_env: String,
    pub cookies_env: String,
}

impl Default for SessionEnv {
    fn default() -> Self {
        Self {
            session_id_env: "STEAM_SESSION_ID".into(),
            access_token_env: "STEAM_ACCESS_TOKEN".into(),
            steam_id_env: "STEAM_ID".into(),
            cookies_env: "STEAM_COOKIES".into(),
        }
    }
}

pub struct Session {
    pub session_id: String,
    access_token: Secret<String>,
    pub steam_id: String,
    /// Raw `name=value; name=value` cookie string.
    cookies: Secret<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("steam_id", &self.steam_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(session_id: String, access_token: String, steam_id: String, cookies: String) -> Self {
        Self {
            session_id,
            access_token: Secret::new(access_token),
            steam_id,
            cookies: Secret::new(cookies),
        }
    }

    /// Read the session from the environment. A missing variable is a
    /// fatal session error.
    pub fn from_env(names: &SessionEnv) -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .map_err(|_| SweeperError::Session(format!("environment variable not set: {name}")))
        };

        Ok(Self::new(
            read(&names.session_id_env)?,
            read(&names.access_token_env)?,
            read(&names.steam_id_env)?,
            read(&names.cookies_env)?,
        ))
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// Default headers for storefront and community requests.
    pub fn headers(&self) -> Pairs {
        vec![("Cookie".to_string(), self.cookie_header())]
    }

    pub fn cookie_header(&self) -> String {
        self.cookies.expose_secret().clone()
    }

    /// Cookie header for the final-price endpoint, which rejects requests
    /// carrying `clientsessionid`.
    pub fn checkout_cookie_header(&self) -> String {
        self.cookies
            .expose_secret()
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.contains("clientsessionid"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
impl Session {
    pub fn sample() -> Self {
        Self::new(
            "sess123".into(),
            "token456".into(),
            "76561190000000000".into(),
            "sessionid=sess123; clientsessionid=abc; steamLoginSecure=xyz".into(),
        )
    }
}
