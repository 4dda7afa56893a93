//! Session identities: egress proxy plus browser fingerprint.
//!
//! Every session worker acquires exactly one [`Identity`] before it opens its
//! session. In single-use mode an issued proxy is removed from the pool so no
//! two sessions ever share an egress address.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::proxy::ProxyConfig;
use crate::{HarvestError, Result};

/// How proxies are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityMode {
    /// No proxies; every session uses direct egress.
    #[default]
    Disabled,
    /// Uniform random proxy per acquisition, entries may repeat.
    Reuse,
    /// Uniform random proxy per acquisition, removed once issued.
    SingleUse,
}

/// Upper bounds for the session viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// Browser fingerprint applied to one session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fingerprint {
    /// User agent drawn from the pool, `None` keeps the engine's own.
    pub user_agent: Option<String>,
    pub viewport: Viewport,
}

/// Egress identity owned by one session for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    /// Proxy to route through, `None` for direct egress.
    pub proxy: Option<ProxyConfig>,
    pub fingerprint: Fingerprint,
}

impl Identity {
    /// Identity with direct egress and the engine's default fingerprint.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Short description for log lines, never including credentials.
    pub fn describe(&self) -> String {
        match &self.proxy {
            Some(proxy) => format!("proxy {}:{}", proxy.host, proxy.port),
            None => "direct".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserAgentEntry {
    Plain(String),
    Tagged { ua: String },
}

/// Parses a user-agent pool: a JSON array of strings or of `{"ua": ...}`.
pub fn parse_user_agents(json: &str) -> Result<Vec<String>> {
    let entries: Vec<UserAgentEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|e| match e {
            UserAgentEntry::Plain(ua) | UserAgentEntry::Tagged { ua } => ua,
        })
        .filter(|ua| !ua.trim().is_empty())
        .collect())
}

/// Reads a user-agent pool from disk.
pub fn load_user_agents(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    parse_user_agents(&content)
}

/// Pool issuing one identity per session.
pub struct IdentityPool {
    proxies: Mutex<Vec<ProxyConfig>>,
    user_agents: Vec<String>,
    viewport: Viewport,
    mode: IdentityMode,
}

impl IdentityPool {
    /// Creates a pool that never issues proxies.
    pub fn direct() -> Self {
        Self {
            proxies: Mutex::new(Vec::new()),
            user_agents: Vec::new(),
            viewport: Viewport::default(),
            mode: IdentityMode::Disabled,
        }
    }

    /// Creates a pool over `proxies` using the given issuance mode.
    pub fn with_proxies(proxies: Vec<ProxyConfig>, mode: IdentityMode) -> Self {
        Self {
            proxies: Mutex::new(proxies),
            mode,
            ..Self::direct()
        }
    }

    /// Sets the user-agent pool used for fingerprints.
    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.user_agents = user_agents;
        self
    }

    /// Sets the viewport bounds used for fingerprints.
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Returns the issuance mode.
    pub fn mode(&self) -> IdentityMode {
        self.mode
    }

    /// Number of proxies still available.
    pub async fn remaining(&self) -> usize {
        self.proxies.lock().await.len()
    }

    /// Issues an identity for one session.
    ///
    /// Fails with [`HarvestError::PoolExhausted`] when proxies are enabled but
    /// none are left to issue.
    pub async fn acquire(&self) -> Result<Identity> {
        let proxy = match self.mode {
            IdentityMode::Disabled => None,
            IdentityMode::Reuse => {
                let proxies = self.proxies.lock().await;
                if proxies.is_empty() {
                    return Err(HarvestError::PoolExhausted);
                }
                let idx = rand::rng().random_range(0..proxies.len());
                Some(proxies[idx].clone())
            }
            IdentityMode::SingleUse => {
                let mut proxies = self.proxies.lock().await;
                if proxies.is_empty() {
                    return Err(HarvestError::PoolExhausted);
                }
                let idx = rand::rng().random_range(0..proxies.len());
                let proxy = proxies.swap_remove(idx);
                debug!("Issued single-use proxy, {} left", proxies.len());
                Some(proxy)
            }
        };

        Ok(Identity {
            proxy,
            fingerprint: self.fingerprint(),
        })
    }

    fn fingerprint(&self) -> Fingerprint {
        let user_agent = if self.user_agents.is_empty() {
            None
        } else {
            let idx = rand::rng().random_range(0..self.user_agents.len());
            Some(self.user_agents[idx].clone())
        };
        Fingerprint {
            user_agent,
            viewport: self.viewport,
        }
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::direct()
    }
}
