//! Bounded-concurrency fetch-and-upload over a batch of URLs.
//!
//! Each URL runs in its own task. Tasks share nothing but the
//! [`ConcurrencyGate`]; a failure or panic in one task becomes a `Failure`
//! outcome for that URL and never reaches its siblings.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::gate::ConcurrencyGate;
use crate::render::{RenderOptions, Renderer};
use crate::report::{BatchReport, BatchStatus, ErrorKind, FetchOutcome};
use crate::request::FetchRequest;
use crate::retry::fetch_with_retry;
use crate::storage::{ObjectStore, Uploader};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no URLs to process")]
    Empty,
    #[error("all {} URL(s) failed; first error: {first_error}", .report.total_count)]
    AllFailed {
        first_error: String,
        report: BatchReport,
    },
}

/// A batch with at least one success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedBatch {
    pub status: BatchStatus,
    pub report: BatchReport,
}

/// Drives render, retry and upload for every URL of a batch.
pub struct BatchRunner {
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn ObjectStore>,
    options: Arc<RenderOptions>,
    concurrency: usize,
    deadline: Option<Duration>,
    key_prefix: Arc<str>,
}

impl BatchRunner {
    /// Create a runner with default render options, no deadline and no key prefix.
    ///
    /// `concurrency` is clamped to `1..=Semaphore::MAX_PERMITS`.
    #[must_use]
    pub fn new(
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn ObjectStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            renderer,
            store,
            options: Arc::new(RenderOptions::default()),
            concurrency: concurrency.clamp(1, Semaphore::MAX_PERMITS),
            deadline: None,
            key_prefix: Arc::from(""),
        }
    }

    /// Create a runner with every tunable taken from `config`.
    #[must_use]
    pub fn from_config(
        config: &Config,
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self::new(renderer, store, config.max_concurrency)
            .with_options(config.render_options())
            .with_deadline(config.batch_deadline)
            .with_key_prefix(&config.key_prefix)
    }

    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Wall-clock cap on the whole batch. Unfinished URLs fail with
    /// `deadline_exceeded` once it passes.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = Arc::from(prefix);
        self
    }

    /// Process every URL and aggregate the outcomes in input order.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Empty` for an empty batch and `BatchError::AllFailed`
    /// when no URL succeeded.
    pub async fn run(&self, urls: &[String], bucket: &str) -> Result<CompletedBatch, BatchError> {
        if urls.is_empty() {
            return Err(BatchError::Empty);
        }

        let started = Instant::now();
        let deadline = self.deadline.map(|d| started + d);
        let gate = ConcurrencyGate::new(self.concurrency);
        let bucket: Arc<str> = Arc::from(bucket);

        info!(
            count = urls.len(),
            concurrency = self.concurrency,
            bucket = %bucket,
            "Starting batch"
        );

        let handles: Vec<_> = urls
            .iter()
            .map(|url| {
                let task = UrlTask {
                    url: url.clone(),
                    bucket: Arc::clone(&bucket),
                    key_prefix: Arc::clone(&self.key_prefix),
                    renderer: Arc::clone(&self.renderer),
                    store: Arc::clone(&self.store),
                    options: Arc::clone(&self.options),
                    gate: gate.clone(),
                };
                tokio::spawn(task.run())
            })
            .collect();

        let mut outcomes = Vec::with_capacity(urls.len());
        for (url, mut handle) in urls.iter().zip(handles) {
            let joined = match deadline {
                Some(deadline) => {
                    if let Ok(joined) = timeout_at(deadline, &mut handle).await {
                        joined
                    } else {
                        handle.abort();
                        warn!(url = %url, "Batch deadline reached, abandoning URL");
                        outcomes.push(
                            FetchOutcome::failure(
                                url,
                                ErrorKind::DeadlineExceeded,
                                "batch deadline exceeded before the page finished",
                            )
                            .with_elapsed(elapsed_ms(started)),
                        );
                        continue;
                    }
                }
                None => handle.await,
            };

            let outcome = joined.unwrap_or_else(|e| {
                error!(url = %url, "Worker task panicked: {e}");
                FetchOutcome::failure(url, ErrorKind::TaskPanicked, format!("task failed: {e}"))
                    .with_elapsed(elapsed_ms(started))
            });
            outcomes.push(outcome);
        }

        let report = BatchReport::from_outcomes(outcomes);
        info!(
            total = report.total_count,
            succeeded = report.success_count,
            failed = report.failure_count(),
            elapsed_ms = elapsed_ms(started),
            "Batch finished"
        );

        match report.status() {
            Some(status) => Ok(CompletedBatch { status, report }),
            None => Err(BatchError::AllFailed {
                first_error: report.first_error().unwrap_or("unknown error").to_string(),
                report,
            }),
        }
    }
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("concurrency", &self.concurrency)
            .field("deadline", &self.deadline)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Everything one URL's task owns.
struct UrlTask {
    url: String,
    bucket: Arc<str>,
    key_prefix: Arc<str>,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn ObjectStore>,
    options: Arc<RenderOptions>,
    gate: ConcurrencyGate,
}

impl UrlTask {
    async fn run(self) -> FetchOutcome {
        let started = Instant::now();
        let outcome = self.process().await;
        outcome.with_elapsed(elapsed_ms(started))
    }

    async fn process(&self) -> FetchOutcome {
        let request = match FetchRequest::new(&self.url, &self.key_prefix) {
            Ok(request) => request,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Skipping invalid URL");
                return FetchOutcome::failure(&self.url, ErrorKind::InvalidUrl, e.to_string());
            }
        };

        // Held until the upload finishes; dropped on every return path.
        let _permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return FetchOutcome::failure(&self.url, ErrorKind::Cancelled, e.to_string());
            }
        };
        debug!(url = %self.url, key = %request.key(), "Acquired render slot");

        let document =
            match fetch_with_retry(self.renderer.as_ref(), request.url(), &self.options).await {
                Ok(document) => document,
                Err(e) => {
                    warn!(url = %self.url, kind = %e.kind, error = %e.message, "Render failed");
                    return FetchOutcome::render_failure(&self.url, &e);
                }
            };

        if let Err(e) = Uploader::new(self.store.as_ref())
            .upload(&document, &self.bucket, request.key())
            .await
        {
            warn!(url = %self.url, key = %request.key(), error = %e, "Upload failed");
            return FetchOutcome::upload_failure(&self.url, &e);
        }

        info!(
            url = %self.url,
            key = %request.key(),
            size = document.len(),
            "Rendered page uploaded"
        );
        FetchOutcome::Success {
            url: self.url.clone(),
            rendered_key: request.key().to_string(),
            content_length: Some(document.len()),
            elapsed_ms: 0,
        }
    }
}
