//! Headless browser sessions for JavaScript-rendered pages.
//!
//! This module is only available when the `headless` Cargo feature is enabled.
//! Every session launches its own Chrome/Chromium process, since the egress
//! proxy is a process-wide launch argument.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::auth::Credentials;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::{Session, SessionFactory, SessionOptions, WaitStrategy};
use crate::{HarvestError, Result};

/// Well-known Chrome/Chromium executable paths per platform.
#[cfg(target_os = "macos")]
const KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(not(target_os = "macos"))]
const KNOWN_PATHS: &[&str] = &[
    "/opt/google/chrome/chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

/// Well-known command names to search in PATH.
const KNOWN_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Finds a Chrome/Chromium executable in PATH or a well-known location.
pub fn find_chrome() -> Option<PathBuf> {
    KNOWN_COMMANDS
        .iter()
        .find_map(|cmd| which::which(cmd).ok())
        .or_else(|| {
            KNOWN_PATHS
                .iter()
                .map(Path::new)
                .find(|p| p.exists())
                .map(Path::to_path_buf)
        })
}

/// Settings shared by every browser session of a run.
#[derive(Debug, Clone)]
pub struct BrowserSessionConfig {
    /// Path to the Chrome/Chromium executable. If `None`, auto-detected.
    pub chrome_path: Option<PathBuf>,
    /// How long to wait after each navigation.
    pub wait: WaitStrategy,
    /// Additional launch arguments for Chrome.
    pub launch_args: Vec<String>,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            wait: WaitStrategy::Load,
            launch_args: Vec::new(),
        }
    }
}

/// Opens one browser process per session.
pub struct BrowserSessionFactory {
    config: BrowserSessionConfig,
}

impl BrowserSessionFactory {
    /// Creates a new browser session factory.
    pub fn new(config: BrowserSessionConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self, options: &SessionOptions) -> Result<BrowserConfig> {
        let chrome = match &self.config.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome().ok_or_else(|| {
                HarvestError::SessionSetup(
                    "no Chrome/Chromium executable found; set chrome_path".to_string(),
                )
            })?,
        };
        debug!(worker = options.worker_id, "Using Chrome at: {}", chrome.display());

        let viewport = options.identity.fingerprint.viewport;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .window_size(viewport.max_width, viewport.max_height);

        if !options.headless {
            builder = builder.with_head();
        }

        // Anti-detection: hide navigator.webdriver and automation indicators
        builder = builder.arg("--disable-blink-features=AutomationControlled");

        builder = builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-default-apps")
            .arg("--disable-sync")
            .arg("--mute-audio")
            .arg("--no-first-run");

        if let Some(ref proxy) = options.identity.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server()));
            if proxy.username.is_some() {
                builder = builder.enable_request_intercept();
            }
        }

        for arg in &self.config.launch_args {
            builder = builder.arg(arg);
        }

        builder
            .build()
            .map_err(|e| HarvestError::SessionSetup(format!("Failed to build browser config: {}", e)))
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn open(&self, options: SessionOptions) -> Result<Box<dyn Session>> {
        let browser_config = self.browser_config(&options)?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| HarvestError::SessionSetup(format!("Failed to launch browser: {}", e)))?;

        let worker = options.worker_id;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!(worker, "Browser CDP handler error: {}", e);
                }
            }
            debug!(worker, "Browser CDP handler exited");
        });

        match configure_page(&browser, &options).await {
            Ok(page) => Ok(Box::new(BrowserSession {
                browser,
                page,
                handler_task,
                wait: self.config.wait.clone(),
            })),
            Err(e) => {
                // The session never started; tear the process down before reporting.
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                Err(e)
            }
        }
    }
}

async fn configure_page(browser: &Browser, options: &SessionOptions) -> Result<Page> {
    let setup = |what: &str, e: chromiumoxide::error::CdpError| {
        HarvestError::SessionSetup(format!("Failed to {}: {}", what, e))
    };

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| setup("open tab", e))?;

    if let Some(ref proxy) = options.identity.proxy {
        if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
            page.authenticate(Credentials {
                username: user.clone(),
                password: pass.clone(),
            })
            .await
            .map_err(|e| setup("set proxy credentials", e))?;
        }
    }

    if let Some(ref ua) = options.identity.fingerprint.user_agent {
        page.set_user_agent(SetUserAgentOverrideParams::new(ua.as_str()))
            .await
            .map_err(|e| setup("set user agent", e))?;
    }

    if !options.cookies.is_empty() {
        let mut params = Vec::with_capacity(options.cookies.len());
        for cookie in &options.cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.as_str())
                .value(cookie.value.as_str())
                .domain(cookie.domain.as_str());
            if let Some(ref path) = cookie.path {
                builder = builder.path(path.as_str());
            }
            match builder.build() {
                Ok(param) => params.push(param),
                Err(e) => warn!("Failed to build cookie {}: {}", cookie.name, e),
            }
        }
        page.set_cookies(params)
            .await
            .map_err(|e| setup("set cookies", e))?;
    }

    Ok(page)
}

/// A session backed by its own browser process.
struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    wait: WaitStrategy,
}

#[async_trait]
impl Session for BrowserSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let nav = |e: chromiumoxide::error::CdpError| HarvestError::navigation(url, e);

        self.page.goto(url).await.map_err(nav)?;

        match &self.wait {
            WaitStrategy::Load => {
                self.page.wait_for_navigation().await.map_err(nav)?;
            }
            WaitStrategy::NetworkIdle { idle_ms } => {
                self.page.wait_for_navigation().await.map_err(nav)?;
                tokio::time::sleep(Duration::from_millis(*idle_ms)).await;
            }
            WaitStrategy::Selector { css, timeout_ms } => {
                // A missing selector is reported by markup(), not here.
                let found = tokio::time::timeout(Duration::from_millis(*timeout_ms), async {
                    self.page.find_element(css.as_str()).await
                })
                .await;
                if let Err(_) | Ok(Err(_)) = found {
                    debug!(
                        "Selector '{}' not found within {}ms, proceeding with current page content",
                        css, timeout_ms
                    );
                }
            }
            WaitStrategy::Delay { ms } => {
                self.page.wait_for_navigation().await.map_err(nav)?;
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
        }
        Ok(())
    }

    async fn markup(&mut self, container: &str) -> Result<String> {
        let element = self
            .page
            .find_element(container)
            .await
            .map_err(|_| HarvestError::StructureMissing(container.to_string()))?;
        element
            .inner_html()
            .await
            .map_err(|e| HarvestError::navigation(container, e))?
            .ok_or_else(|| HarvestError::StructureMissing(container.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to reap browser process: {}", e);
        }
        self.handler_task.abort();
        closed
            .map(|_| ())
            .map_err(|e| HarvestError::SessionSetup(format!("Failed to close browser: {}", e)))
    }
}
