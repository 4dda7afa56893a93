//! Run configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! command-line overrides applied by the binary.
//!
//! ```toml
//! limit = 30
//! sessions = 4
//! pacing = "0.8,1.2"
//! on_failure = "consecutive:3"
//! use_proxy = true
//! proxy_once = true
//! proxy_file = "proxies.txt"
//!
//! [viewport]
//! max_width = 1600
//! max_height = 900
//!
//! [wait]
//! kind = "delay"
//! ms = 500
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::controller::RunOptions;
use crate::identity::{load_user_agents, IdentityMode, IdentityPool, Viewport};
use crate::pacing::Pacing;
use crate::partition::ItemLimit;
use crate::proxy::ProxyConfig;
use crate::session::{load_cookies, SessionCookie, WaitStrategy};
use crate::worker::FailurePolicy;
use crate::{HarvestError, Result};

/// Document retrieval engine behind the sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Chrome/Chromium over the DevTools protocol.
    #[default]
    Browser,
    /// Plain HTTP requests, no JavaScript.
    Http,
}

/// Everything a run needs besides the job itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Items to process, `-1` for all.
    pub limit: i64,
    pub sessions: usize,
    pub headless: bool,
    /// With `headless = false`, sessions that get a visible window.
    pub visible_sessions: usize,
    pub pacing: Pacing,
    pub on_failure: FailurePolicy,

    /// Route sessions through proxies from `proxy_file`.
    pub use_proxy: bool,
    /// Give every session its own proxy.
    pub proxy_once: bool,
    pub proxy_file: PathBuf,
    /// JSON user-agent pool.
    pub user_agents: Option<PathBuf>,
    /// JSON cookie export injected into every session.
    pub cookies: Option<PathBuf>,
    pub viewport: Viewport,

    /// Overrides the job's input table.
    pub input: Option<PathBuf>,
    /// Overrides the job's output table.
    pub output: Option<PathBuf>,

    pub backend: Backend,
    pub wait: WaitStrategy,
    pub chrome_path: Option<PathBuf>,
    pub launch_args: Vec<String>,
    /// Request timeout of the HTTP backend.
    pub timeout_secs: u64,
    pub base_url: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            limit: -1,
            sessions: 2,
            headless: true,
            visible_sessions: 1,
            pacing: Pacing::default(),
            on_failure: FailurePolicy::default(),
            use_proxy: false,
            proxy_once: false,
            proxy_file: PathBuf::from("proxies.txt"),
            user_agents: None,
            cookies: None,
            viewport: Viewport::default(),
            input: None,
            output: None,
            backend: Backend::default(),
            wait: WaitStrategy::default(),
            chrome_path: None,
            launch_args: Vec::new(),
            timeout_secs: 30,
            base_url: "https://www.hltv.org".to_string(),
        }
    }
}

impl RunConfig {
    /// Parses a TOML configuration. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HarvestError::Config(e.to_string()))
    }

    /// Reads a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HarvestError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Checks settings that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        ItemLimit::from_signed(self.limit)?;
        if self.sessions == 0 {
            return Err(HarvestError::Config(
                "sessions must be at least 1".to_string(),
            ));
        }
        if self.viewport.max_width == 0 || self.viewport.max_height == 0 {
            return Err(HarvestError::Config("viewport must not be empty".to_string()));
        }
        self.base_url()?;
        if self.proxy_once && !self.use_proxy {
            warn!("proxy_once has no effect without use_proxy");
        }
        Ok(())
    }

    pub fn item_limit(&self) -> Result<ItemLimit> {
        ItemLimit::from_signed(self.limit)
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| HarvestError::Config(format!("base_url '{}': {}", self.base_url, e)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn identity_mode(&self) -> IdentityMode {
        match (self.use_proxy, self.proxy_once) {
            (false, _) => IdentityMode::Disabled,
            (true, false) => IdentityMode::Reuse,
            (true, true) => IdentityMode::SingleUse,
        }
    }

    /// Builds the identity pool from the proxy list and user-agent pool.
    pub fn identity_pool(&self) -> Result<IdentityPool> {
        let mode = self.identity_mode();
        let proxies = match mode {
            IdentityMode::Disabled => Vec::new(),
            _ => ProxyConfig::load(&self.proxy_file)?,
        };
        if mode == IdentityMode::SingleUse && proxies.len() < self.sessions {
            warn!(
                proxies = proxies.len(),
                sessions = self.sessions,
                "Fewer single-use proxies than sessions; the extra sessions will not start"
            );
        }
        let user_agents = match &self.user_agents {
            Some(path) => load_user_agents(path)?,
            None => Vec::new(),
        };
        Ok(IdentityPool::with_proxies(proxies, mode)
            .with_user_agents(user_agents)
            .with_viewport(self.viewport))
    }

    /// Loads the cookies injected into every session.
    pub fn cookies(&self) -> Result<Vec<SessionCookie>> {
        match &self.cookies {
            Some(path) => load_cookies(path),
            None => Ok(Vec::new()),
        }
    }

    /// Scheduling options for the run controller.
    pub fn run_options(&self) -> Result<RunOptions> {
        Ok(RunOptions {
            sessions: self.sessions,
            limit: self.item_limit()?,
            headless: self.headless,
            visible_sessions: self.visible_sessions,
            pacing: self.pacing,
            policy: self.on_failure,
        })
    }
}
