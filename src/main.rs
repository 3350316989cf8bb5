use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use page_render_archiver::config::Config;
use page_render_archiver::handler::handle_event;
use page_render_archiver::render::{ChromiumRenderer, Renderer};
use page_render_archiver::request::InvocationEvent;
use page_render_archiver::storage::{MemoryStore, ObjectStore, S3Store};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    info!("Starting page-render-archiver");

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        max_concurrency = config.max_concurrency,
        nav_timeout_ms = config.nav_timeout.as_millis() as u64,
        idle_timeout_ms = config.idle_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let raw_event = read_event(std::env::args().nth(1)).await?;
    let event = InvocationEvent::from_json(&raw_event).context("Invalid invocation event")?;

    let store: Arc<dyn ObjectStore> = if config.dry_run {
        warn!("DRY_RUN enabled - rendered pages will not be uploaded");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(S3Store::from_config(&config).context("Failed to initialize S3 client")?)
    };
    let renderer: Arc<dyn Renderer> = Arc::new(ChromiumRenderer::new(config.browser_settings()));

    match handle_event(&config, &event, renderer, store).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_payload())?);
            Err(e.into())
        }
    }
}

/// Read the invocation event from the given file, or from stdin.
async fn read_event(path: Option<String>) -> Result<String> {
    if let Some(path) = path {
        return tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read event file: {path}"));
    }

    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("Failed to read event from stdin")?;
    Ok(raw)
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,page_render_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    // Logs go to stderr; stdout carries the response
    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
