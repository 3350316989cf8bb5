//! Headless Chrome/Chromium renderer.
//!
//! Every call launches its own browser process with a throwaway user-data
//! directory, so cookies, service workers and crashes never leak between URLs.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use super::scroll::{settle_scroll, ScrollTarget};
use super::{HtmlDocument, RenderError, RenderOptions, Renderer};
use crate::constants::{ARCHIVAL_USER_AGENT, HEAVY_RESOURCE_PATTERNS};

/// Default viewport width in pixels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height in pixels.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;

/// Interval between network-quiet probes.
const QUIET_POLL_INTERVAL: Duration = Duration::from_millis(500);

const SCROLL_HEIGHT_JS: &str =
    "document.body ? document.body.scrollHeight : document.documentElement.scrollHeight";

const PAGE_ACTIVITY_JS: &str = "({ ready: document.readyState, \
    resources: performance.getEntriesByType('resource').length })";

/// Browser launch settings.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Path to Chrome/Chromium executable (None for auto-detection).
    pub chrome_path: Option<String>,
    /// Viewport width in pixels.
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// Timeout for individual DevTools requests, including navigation.
    pub request_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Renderer that launches a fresh headless browser per page.
#[derive(Debug, Clone, Default)]
pub struct ChromiumRenderer {
    settings: BrowserSettings,
}

impl ChromiumRenderer {
    #[must_use]
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(
        &self,
        url: &Url,
        options: &RenderOptions,
    ) -> Result<HtmlDocument, RenderError> {
        let profile_dir = tempfile::Builder::new()
            .prefix("render-profile-")
            .tempdir()
            .map_err(|e| RenderError::permanent(format!("failed to create profile dir: {e}")))?;

        let session = BrowserSession::launch(&self.settings, profile_dir.path()).await?;
        let result = render_page(&session.browser, url, options).await;
        session.close().await;

        result
    }
}

/// A launched browser plus the task driving its DevTools connection.
///
/// Dropping the session aborts the handler task; chromiumoxide kills the child
/// process when the `Browser` is dropped, so an aborted render still cleans up.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(settings: &BrowserSettings, profile_dir: &Path) -> Result<Self, RenderError> {
        let mut config_builder = BrowserConfig::builder()
            .window_size(settings.viewport_width, settings.viewport_height)
            .request_timeout(settings.request_timeout)
            .user_data_dir(profile_dir)
            .no_sandbox()
            .disable_default_args()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-software-rasterizer")
            .arg("--no-zygote")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-component-update")
            .arg("--disable-default-apps")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--mute-audio")
            .arg("--hide-scrollbars")
            .arg(format!("--user-agent={ARCHIVAL_USER_AGENT}"));

        if let Some(ref chrome_path) = settings.chrome_path {
            config_builder = config_builder.chrome_executable(chrome_path);
        }

        let browser_config = config_builder
            .build()
            .map_err(|e| RenderError::permanent(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::permanent(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        debug!("Headless browser launched");
        Ok(Self { browser, handler })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to reap browser process: {e}");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn render_page(
    browser: &Browser,
    url: &Url,
    options: &RenderOptions,
) -> Result<HtmlDocument, RenderError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| RenderError::classify("new page", e))?;

    let result = load_and_extract(&page, url, options).await;

    if let Err(e) = page.close().await {
        debug!("Failed to close page: {e}");
    }

    result
}

async fn load_and_extract(
    page: &Page,
    url: &Url,
    options: &RenderOptions,
) -> Result<HtmlDocument, RenderError> {
    if options.block_heavy_resources {
        block_heavy_resources(page).await;
    }

    info!(url = %url, "Navigating");
    match timeout(options.nav_timeout, page.goto(url.as_str())).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(RenderError::classify("navigate", e)),
        Err(_) => {
            return Err(RenderError::permanent(format!(
                "navigation timed out after {}ms",
                options.nav_timeout.as_millis()
            )))
        }
    }

    if timeout(options.idle_timeout, wait_for_quiet(page)).await.is_err() {
        debug!(url = %url, "Network did not go quiet before idle timeout; continuing");
    }

    let summary = settle_scroll(&PageScroller(page), &options.scroll).await?;
    debug!(
        url = %url,
        rounds = summary.rounds,
        height = summary.final_height,
        stop = ?summary.stop,
        "Scrolled to bottom"
    );

    tokio::time::sleep(options.settle_delay).await;

    let html = page
        .content()
        .await
        .map_err(|e| RenderError::classify("content", e))?;

    Ok(HtmlDocument::new(html))
}

/// Block images, media and fonts. Best effort: failures only cost speed.
async fn block_heavy_resources(page: &Page) {
    if let Err(e) = page.execute(EnableParams::default()).await {
        warn!("Failed to enable Network domain: {e}");
        return;
    }
    let patterns = HEAVY_RESOURCE_PATTERNS
        .iter()
        .map(|p| (*p).to_string())
        .collect();
    if let Err(e) = page.execute(SetBlockedUrLsParams::new(patterns)).await {
        warn!("Failed to block heavy resources: {e}");
    }
}

#[derive(Debug, Deserialize)]
struct PageActivity {
    ready: String,
    resources: u64,
}

/// Poll until the document is complete and no new resources were fetched
/// between two probes. Probe errors end the wait early.
async fn wait_for_quiet(page: &Page) {
    let mut last_count = None;
    loop {
        let activity = match page.evaluate(PAGE_ACTIVITY_JS).await {
            Ok(result) => match result.into_value::<PageActivity>() {
                Ok(activity) => activity,
                Err(e) => {
                    debug!("Unexpected page activity probe result: {e}");
                    return;
                }
            },
            Err(e) => {
                debug!("Page activity probe failed: {e}");
                return;
            }
        };

        if activity.ready == "complete" && last_count == Some(activity.resources) {
            return;
        }
        last_count = Some(activity.resources);
        tokio::time::sleep(QUIET_POLL_INTERVAL).await;
    }
}

struct PageScroller<'a>(&'a Page);

#[async_trait]
impl<'a> ScrollTarget for PageScroller<'a> {
    async fn scroll_height(&self) -> Result<u64, RenderError> {
        self.0
            .evaluate(SCROLL_HEIGHT_JS)
            .await
            .map_err(|e| RenderError::classify("measure height", e))?
            .into_value::<u64>()
            .map_err(|e| RenderError::permanent(format!("measure height: {e}")))
    }

    async fn scroll_to(&self, y: u64) -> Result<(), RenderError> {
        self.0
            .evaluate(format!("window.scrollTo(0, {y})"))
            .await
            .map(|_| ())
            .map_err(|e| RenderError::classify("scroll", e))
    }
}
