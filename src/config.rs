use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::render::chromium::BrowserSettings;
use crate::render::scroll::ScrollPolicy;
use crate::render::RenderOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Concurrency
    pub max_concurrency: usize,
    pub batch_deadline: Option<Duration>,

    // Rendering
    pub nav_timeout: Duration,
    pub idle_timeout: Duration,
    pub scroll_pause: Duration,
    pub scroll_max_rounds: u32,
    pub scroll_budget: Duration,
    pub settle_delay: Duration,
    pub block_heavy_resources: bool,
    pub chrome_path: Option<String>,

    // S3 Storage
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub key_prefix: String,
    pub dry_run: bool,

    // Input
    pub fallback_config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let deadline_secs = parse_env_u64("BATCH_DEADLINE_SECS", 840)?;

        Ok(Self {
            // Concurrency
            max_concurrency: parse_env_usize("MAX_CONCURRENCY", 3)?,
            batch_deadline: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),

            // Rendering
            nav_timeout: Duration::from_millis(parse_env_u64("NAV_TIMEOUT_MS", 60_000)?),
            idle_timeout: Duration::from_millis(parse_env_u64("IDLE_TIMEOUT_MS", 15_000)?),
            scroll_pause: Duration::from_millis(parse_env_u64("SCROLL_PAUSE_MS", 3_000)?),
            scroll_max_rounds: parse_env_u32("SCROLL_MAX_ROUNDS", 25)?,
            scroll_budget: Duration::from_millis(parse_env_u64("SCROLL_BUDGET_MS", 60_000)?),
            settle_delay: Duration::from_millis(parse_env_u64("SETTLE_DELAY_MS", 5_000)?),
            block_heavy_resources: parse_env_bool("BLOCK_HEAVY_RESOURCES", true)?,
            chrome_path: optional_env("CHROME_PATH"),

            // S3 Storage
            s3_region: optional_env("S3_REGION")
                .or_else(|| optional_env("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".to_string()),
            s3_endpoint: optional_env("S3_ENDPOINT"),
            key_prefix: env_or_default("KEY_PREFIX", ""),
            dry_run: parse_env_bool("DRY_RUN", false)?,

            // Input
            fallback_config_path: PathBuf::from(env_or_default(
                "FALLBACK_CONFIG_PATH",
                "render-batch.toml",
            )),
        })
    }

    /// Configuration with defaults and no environment lookups, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_concurrency: 2,
            batch_deadline: None,
            nav_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(1),
            scroll_pause: Duration::ZERO,
            scroll_max_rounds: 3,
            scroll_budget: Duration::from_secs(1),
            settle_delay: Duration::ZERO,
            block_heavy_resources: true,
            chrome_path: None,
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            key_prefix: String::new(),
            dry_run: true,
            fallback_config_path: PathBuf::from("render-batch.toml"),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidValue {
                name: "MAX_CONCURRENCY".to_string(),
                message: format!("cannot exceed {}", Semaphore::MAX_PERMITS),
            });
        }
        if self.nav_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "NAV_TIMEOUT_MS".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.idle_timeout > self.nav_timeout {
            return Err(ConfigError::InvalidValue {
                name: "IDLE_TIMEOUT_MS".to_string(),
                message: "cannot exceed NAV_TIMEOUT_MS".to_string(),
            });
        }
        Ok(())
    }

    /// Per-page rendering options derived from this configuration.
    #[must_use]
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            nav_timeout: self.nav_timeout,
            idle_timeout: self.idle_timeout,
            scroll: ScrollPolicy {
                pause: self.scroll_pause,
                max_rounds: self.scroll_max_rounds,
                budget: self.scroll_budget,
            },
            settle_delay: self.settle_delay,
            block_heavy_resources: self.block_heavy_resources,
        }
    }

    /// Browser launch settings derived from this configuration.
    #[must_use]
    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            chrome_path: self.chrome_path.clone(),
            request_timeout: self.nav_timeout,
            ..BrowserSettings::default()
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
