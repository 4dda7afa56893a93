//! Session abstraction over the document retrieval engine.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::Identity;
use crate::Result;

/// Strategy for waiting until a page is considered fully loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WaitStrategy {
    /// Wait for the page load event only.
    #[default]
    Load,
    /// Wait until network activity settles for the given duration.
    NetworkIdle {
        /// Milliseconds of network inactivity to wait for.
        idle_ms: u64,
    },
    /// Wait until a CSS selector matches an element on the page.
    Selector {
        /// CSS selector to wait for.
        css: String,
        /// Maximum time to wait in milliseconds before timing out.
        timeout_ms: u64,
    },
    /// Wait a fixed delay after the page load event.
    Delay {
        /// Milliseconds to wait after page load.
        ms: u64,
    },
}

/// A cookie injected identically into every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: Option<String>,
}

/// Parses a cookie export: a JSON array of objects with `name` (or `key`),
/// `value`, `domain` and optional `path`. Entries without a name or a domain
/// are skipped.
pub fn parse_cookies(json: &str) -> Result<Vec<SessionCookie>> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let field = |c: &serde_json::Value, key: &str| {
        c.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let mut cookies = Vec::new();
    for cookie in &raw {
        let mut name = field(cookie, "name");
        if name.is_empty() {
            name = field(cookie, "key");
        }
        let domain = field(cookie, "domain");
        if name.is_empty() || domain.is_empty() {
            debug!("Skipping cookie without name or domain");
            continue;
        }
        let path = Some(field(cookie, "path")).filter(|p| !p.is_empty());
        cookies.push(SessionCookie {
            name,
            value: field(cookie, "value"),
            domain,
            path,
        });
    }
    Ok(cookies)
}

/// Reads a cookie export from disk.
pub fn load_cookies(path: &Path) -> Result<Vec<SessionCookie>> {
    let content = std::fs::read_to_string(path)?;
    parse_cookies(&content)
}

/// Per-session settings handed to a [`SessionFactory`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Worker that will own the session.
    pub worker_id: usize,
    /// Run without a visible window.
    pub headless: bool,
    /// Egress proxy and fingerprint.
    pub identity: Identity,
    /// Cookies injected before the first navigation.
    pub cookies: Vec<SessionCookie>,
}

/// One live document retrieval session, owned by one worker.
///
/// All configuration (identity, cookies, wait strategy) is applied when the
/// session is opened; afterwards it is a simple navigate/markup interface.
#[async_trait]
pub trait Session: Send {
    /// Navigates to `url`.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Returns the inner markup of the first element matching `container`
    /// on the current page.
    async fn markup(&mut self, container: &str) -> Result<String>;

    /// Releases the session's resources.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions for workers.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a configured session.
    async fn open(&self, options: SessionOptions) -> Result<Box<dyn Session>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_strategy_default() {
        assert!(matches!(WaitStrategy::default(), WaitStrategy::Load));
    }

    #[test]
    fn test_wait_strategy_deserialize() {
        let strategy: WaitStrategy =
            toml::from_str("kind = \"selector\"\ncss = \"div.colCon\"\ntimeout_ms = 5000").unwrap();
        assert_eq!(
            strategy,
            WaitStrategy::Selector {
                css: "div.colCon".to_string(),
                timeout_ms: 5000
            }
        );

        let idle: WaitStrategy = toml::from_str("kind = \"network-idle\"\nidle_ms = 500").unwrap();
        assert_eq!(idle, WaitStrategy::NetworkIdle { idle_ms: 500 });
    }

    #[test]
    fn test_parse_cookies() {
        let json = r#"[
            {"name": "autologin", "value": "abc", "domain": ".hltv.org", "path": "/"},
            {"key": "CookieConsent", "value": "yes", "domain": "www.hltv.org"},
            {"name": "orphan", "value": "x"},
            {"value": "no-name", "domain": ".hltv.org"}
        ]"#;
        let cookies = parse_cookies(json).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].path.as_deref(), Some("/"));
        assert_eq!(cookies[1].name, "CookieConsent");
        assert!(cookies[1].path.is_none());
    }

    #[test]
    fn test_parse_cookies_invalid_json() {
        assert!(parse_cookies("{not json").is_err());
    }
}
