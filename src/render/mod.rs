//! Page rendering in a headless browser.
//!
//! A [`Renderer`] turns a URL into the page's final serialized markup, after
//! client-side scripts and scroll-triggered loading have run. Failures carry a
//! [`RenderErrorKind`] so callers can tell a dead browser session apart from a
//! broken page.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

pub mod chromium;
pub mod scroll;

pub use chromium::ChromiumRenderer;
pub use scroll::{settle_scroll, ScrollPolicy, ScrollTarget};

/// Per-page rendering options.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Hard timeout for navigation up to DOM construction.
    pub nav_timeout: Duration,
    /// Soft timeout for network quiescence. Expiry is not an error.
    pub idle_timeout: Duration,
    /// Bounds for the incremental scroll loop.
    pub scroll: ScrollPolicy,
    /// Final pause after scrolling, before the markup is read.
    pub settle_delay: Duration,
    /// Block images, media and fonts.
    pub block_heavy_resources: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(15),
            scroll: ScrollPolicy::default(),
            settle_delay: Duration::from_secs(5),
            block_heavy_resources: true,
        }
    }
}

/// Serialized markup of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDocument(String);

impl HtmlDocument {
    #[must_use]
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Length in bytes once UTF-8 encoded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Failure class of a render attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    /// The browser session or target was torn down mid-operation. Retryable once.
    Transient,
    /// Anything attributable to the page or its network: timeouts, DNS, script
    /// errors, extraction failures, failed launches.
    Permanent,
}

impl RenderErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified render failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} render error: {message}")]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub message: String,
}

impl RenderError {
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: RenderErrorKind::Transient,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: RenderErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Build an error from a browser failure, classifying it by its text.
    ///
    /// Only the error text is classified; `stage` is a message prefix.
    #[must_use]
    pub fn classify(stage: &str, err: impl fmt::Display) -> Self {
        let text = err.to_string();
        Self {
            kind: classify_message(&text),
            message: format!("{stage}: {text}"),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == RenderErrorKind::Transient
    }
}

// Teardown texts from Chrome's DevTools protocol, chromiumoxide and its websocket.
static TRANSIENT_PATTERNS: std::sync::LazyLock<Vec<Regex>> = std::sync::LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\btarget (page, context or browser )?(has been )?closed\b").unwrap(),
        Regex::new(r"(?i)\bsession (closed|with given id not found)\b").unwrap(),
        Regex::new(r"(?i)\bno target with given id\b").unwrap(),
        Regex::new(r"(?i)\binspected target navigated or closed\b").unwrap(),
        Regex::new(r"(?i)\bnot attached to an active page\b").unwrap(),
        Regex::new(r"(?i)\bbrowser (has )?(disconnected|crashed)\b").unwrap(),
        Regex::new(r"(?i)\bwebsocket (closed|error)\b|\bconnection closed normally\b").unwrap(),
        Regex::new(r"(?i)\bclosed connection\b|\bchannel (closed|send error)\b").unwrap(),
        Regex::new(r"(?i)\boneshot canceled\b").unwrap(),
    ]
});

/// Classify a browser error message.
///
/// Only session teardown counts as transient; everything else is permanent.
#[must_use]
pub fn classify_message(message: &str) -> RenderErrorKind {
    if TRANSIENT_PATTERNS.iter().any(|p| p.is_match(message)) {
        RenderErrorKind::Transient
    } else {
        RenderErrorKind::Permanent
    }
}

/// Something that can render a URL to markup.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render the page at `url`.
    ///
    /// Implementations must release every browser resource they acquired before
    /// returning, on success and on failure.
    ///
    /// # Errors
    ///
    /// Returns a classified [`RenderError`] if the page cannot be rendered.
    async fn render(&self, url: &Url, options: &RenderOptions)
        -> Result<HtmlDocument, RenderError>;
}
