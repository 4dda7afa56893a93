//! Proxy credentials used as session egress identities.
//!
//! Proxy lists are plain text, one `server:port:username:password` entry per
//! line. Entries without credentials (`server:port`) are accepted too.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{HarvestError, Result};

/// Proxy protocol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    /// HTTP proxy
    #[default]
    Http,
    /// HTTPS proxy
    Https,
    /// SOCKS5 proxy
    Socks5,
}

impl ProxyProtocol {
    fn scheme(self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        }
    }
}

/// A single proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host (IP or domain)
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Proxy protocol
    #[serde(default)]
    pub protocol: ProxyProtocol,
    /// Optional username for authentication
    pub username: Option<String>,
    /// Optional password for authentication
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Creates a new proxy configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: ProxyProtocol::Http,
            username: None,
            password: None,
        }
    }

    /// Sets the proxy protocol.
    pub fn with_protocol(mut self, protocol: ProxyProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets authentication credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Parses one `server:port[:username:password]` line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.trim().split(':').collect();
        let (host, port) = match parts.as_slice() {
            [host, port] | [host, port, _, _] => (*host, *port),
            _ => {
                return Err(HarvestError::Config(format!(
                    "expected server:port:username:password, got '{}'",
                    line.trim()
                )))
            }
        };
        if host.is_empty() {
            return Err(HarvestError::Config(format!("missing proxy server in '{}'", line.trim())));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| HarvestError::Config(format!("invalid proxy port '{}'", port)))?;

        let mut config = ProxyConfig::new(host, port);
        if let [_, _, user, pass] = parts.as_slice() {
            config = config.with_auth(*user, *pass);
        }
        Ok(config)
    }

    /// Parses a whole proxy list, skipping blank lines and `#` comments.
    pub fn parse_list(content: &str) -> Result<Vec<Self>> {
        let mut proxies = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let proxy = Self::parse_line(line).map_err(|e| {
                HarvestError::Config(format!("proxy list line {}: {}", idx + 1, e))
            })?;
            proxies.push(proxy);
        }
        Ok(proxies)
    }

    /// Reads a proxy list from disk.
    pub fn load(path: &Path) -> Result<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        let proxies = Self::parse_list(&content)?;
        debug!("Loaded {} proxies from {}", proxies.len(), path.display());
        Ok(proxies)
    }

    /// Returns the address without credentials, as passed to `--proxy-server`.
    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Returns the proxy URL string, including credentials when present.
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!(
                    "{}://{}:{}@{}:{}",
                    self.protocol.scheme(),
                    user,
                    pass,
                    self.host,
                    self.port
                )
            }
            _ => self.server(),
        }
    }
}
