//! Single-invocation entry point: event in, response out.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, ConfigError};
use crate::orchestrator::{BatchError, BatchRunner};
use crate::render::Renderer;
use crate::report::InvocationResponse;
use crate::request::{resolve_request, FallbackConfig, InvocationEvent};
use crate::storage::ObjectStore;

/// Errors that escape an invocation. Per-URL failures never do.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("batch failed: {0}")]
    Batch(#[from] BatchError),
}

impl InvocationError {
    /// Machine-readable payload describing the failure.
    #[must_use]
    pub fn to_payload(&self) -> ErrorResponse {
        let error_type = match self {
            Self::Config(_) => "ConfigError",
            Self::Batch(_) => "BatchError",
        };
        ErrorResponse {
            error_type,
            error_message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_type: &'static str,
    pub error_message: String,
}

/// Resolve the batch, render and upload every URL, and build the response.
///
/// The fallback file is only read when the event leaves a field unset.
///
/// # Errors
///
/// Returns `InvocationError::Config` before any rendering if the URLs or
/// bucket cannot be resolved, and `InvocationError::Batch` if every URL failed.
pub async fn handle_event(
    config: &Config,
    event: &InvocationEvent,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn ObjectStore>,
) -> Result<InvocationResponse, InvocationError> {
    let fallback = if event.is_complete() {
        None
    } else {
        FallbackConfig::load(&config.fallback_config_path)?
    };
    let request = resolve_request(event, fallback.as_ref())?;

    info!(
        urls = request.urls.len(),
        bucket = %request.bucket,
        "Resolved batch request"
    );

    let batch = BatchRunner::from_config(config, renderer, store)
        .run(&request.urls, &request.bucket)
        .await?;

    Ok(InvocationResponse::new(
        &batch.report,
        batch.status,
        &request.bucket,
    ))
}
