//! Invocation input: event payload, fallback file, and per-URL requests.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::ConfigError;
use crate::constants::{FALLBACK_KEY_NAME, KEY_EXTENSION};

/// Invocation event payload.
///
/// `url` is the single-page form and is appended to `urls` when both are set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvocationEvent {
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
}

impl InvocationEvent {
    /// Parse an event from raw JSON. Blank input is an empty event.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a JSON object of the expected shape.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
            what: "invocation event".to_string(),
            message: e.to_string(),
        })
    }

    /// Whether the event alone supplies both URLs and a bucket.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.collected_urls().is_some() && self.bucket.as_ref().is_some_and(|b| !b.is_empty())
    }

    fn collected_urls(&self) -> Option<Vec<String>> {
        let mut urls = self.urls.clone().unwrap_or_default();
        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            urls.push(url.clone());
        }
        (!urls.is_empty()).then_some(urls)
    }
}

/// Static fallback configuration read from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub bucket: Option<String>,
}

impl FallbackConfig {
    /// Load the fallback file, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No fallback config file");
                return Ok(None);
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        toml::from_str(&raw)
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                what: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

/// A fully resolved batch: what to render and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub urls: Vec<String>,
    pub bucket: String,
}

/// Resolve the batch from the event, falling back field by field to the static file.
///
/// # Errors
///
/// Returns `ConfigError::MissingField` if neither source supplies non-empty URLs
/// and a bucket.
pub fn resolve_request(
    event: &InvocationEvent,
    fallback: Option<&FallbackConfig>,
) -> Result<BatchRequest, ConfigError> {
    let urls = event
        .collected_urls()
        .or_else(|| {
            fallback
                .and_then(|f| f.urls.clone())
                .filter(|u| !u.is_empty())
        })
        .ok_or_else(|| ConfigError::MissingField("urls".to_string()))?;

    let bucket = event
        .bucket
        .clone()
        .filter(|b| !b.is_empty())
        .or_else(|| fallback.and_then(|f| f.bucket.clone()).filter(|b| !b.is_empty()))
        .ok_or_else(|| ConfigError::MissingField("bucket".to_string()))?;

    Ok(BatchRequest { urls, bucket })
}

/// Why a URL string cannot be turned into a fetch request.
#[derive(Debug, thiserror::Error)]
pub enum InvalidUrl {
    #[error("cannot parse URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme '{0}'")]
    Scheme(String),
}

/// One URL to render, with its storage key already derived.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    url: Url,
    key: String,
}

impl FetchRequest {
    /// Validate a URL string and derive its key.
    ///
    /// # Errors
    ///
    /// Returns an error for unparseable URLs and non-HTTP(S) schemes.
    pub fn new(raw: &str, key_prefix: &str) -> Result<Self, InvalidUrl> {
        let url = Url::parse(raw)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(InvalidUrl::Scheme(url.scheme().to_string()));
        }
        let key = format!("{key_prefix}{}", key_for(&url));
        Ok(Self { url, key })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Derive the storage key for a URL string.
///
/// # Errors
///
/// Returns an error if the string is not a valid URL.
///
/// # Examples
///
/// ```
/// # use page_render_archiver::request::derive_key;
/// assert_eq!(derive_key("https://x.com/a/b/").unwrap(), "b.html");
/// assert_eq!(derive_key("https://x.com/").unwrap(), "index.html");
/// ```
pub fn derive_key(url: &str) -> Result<String, url::ParseError> {
    Url::parse(url).map(|u| key_for(&u))
}

/// Key from the last non-empty path segment, ignoring query and fragment.
///
/// Distinct URLs can map to the same key; the later upload overwrites the earlier one.
#[must_use]
pub fn key_for(url: &Url) -> String {
    let name = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or(FALLBACK_KEY_NAME);
    format!("{name}{KEY_EXTENSION}")
}
