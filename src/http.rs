//! HTTP-based sessions using reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, Proxy};
use scraper::Html;
use tracing::debug;

use crate::extract::css;
use crate::session::{Session, SessionCookie, SessionFactory, SessionOptions};
use crate::{HarvestError, Result};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; a3s-harvest/0.1)";

/// Opens plain HTTP sessions.
///
/// Suitable for sites that return server-rendered HTML. For pages that
/// require JavaScript rendering, use `BrowserSessionFactory` instead.
pub struct HttpSessionFactory {
    timeout: Duration,
}

impl HttpSessionFactory {
    /// Creates a factory with a 30 second request timeout.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self, options: &SessionOptions) -> Result<Client> {
        let user_agent = options
            .identity
            .fingerprint
            .user_agent
            .as_deref()
            .unwrap_or(DEFAULT_USER_AGENT);

        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .cookie_provider(Arc::new(cookie_jar(&options.cookies)));

        if let Some(ref proxy_config) = options.identity.proxy {
            debug!(
                worker = options.worker_id,
                "Using proxy: {}:{}", proxy_config.host, proxy_config.port
            );
            let proxy = Proxy::all(proxy_config.url())
                .map_err(|e| HarvestError::SessionSetup(format!("Failed to create proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| HarvestError::SessionSetup(format!("Failed to create HTTP client: {}", e)))
    }
}

impl Default for HttpSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn cookie_jar(cookies: &[SessionCookie]) -> Jar {
    let jar = Jar::default();
    for cookie in cookies {
        let host = cookie.domain.trim_start_matches('.');
        let Ok(url) = format!("https://{}", host).parse::<reqwest::Url>() else {
            continue;
        };
        let path = cookie.path.as_deref().unwrap_or("/");
        let cookie_str = format!(
            "{}={}; Domain={}; Path={}",
            cookie.name, cookie.value, cookie.domain, path
        );
        jar.add_cookie_str(&cookie_str, &url);
    }
    jar
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self, options: SessionOptions) -> Result<Box<dyn Session>> {
        Ok(Box::new(HttpSession {
            client: self.client(&options)?,
            body: None,
        }))
    }
}

/// A session that fetches documents over plain HTTP.
struct HttpSession {
    client: Client,
    body: Option<String>,
}

#[async_trait]
impl Session for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.body = None;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HarvestError::navigation(url, e))?;
        let html = response
            .text()
            .await
            .map_err(|e| HarvestError::navigation(url, e))?;
        self.body = Some(html);
        Ok(())
    }

    async fn markup(&mut self, container: &str) -> Result<String> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| HarvestError::navigation(container, "no page loaded"))?;
        inner_html(body, container)
    }

    async fn close(&mut self) -> Result<()> {
        self.body = None;
        Ok(())
    }
}

/// Inner markup of the first element matching `container` in `html`.
fn inner_html(html: &str, container: &str) -> Result<String> {
    let selector = css(container)?;
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .next()
        .map(|el| el.inner_html())
        .ok_or_else(|| HarvestError::StructureMissing(container.to_string()))
}
