//! Per-URL outcomes, the batch report, and the invocation response.

use std::fmt;

use serde::Serialize;

use crate::render::{RenderError, RenderErrorKind};
use crate::storage::UploadError;

/// Classification carried by a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    TransientRender,
    PermanentRender,
    Upload,
    DeadlineExceeded,
    Cancelled,
    TaskPanicked,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::TransientRender => "transient_render",
            Self::PermanentRender => "permanent_render",
            Self::Upload => "upload",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
            Self::TaskPanicked => "task_panicked",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&RenderError> for ErrorKind {
    fn from(err: &RenderError) -> Self {
        match err.kind {
            RenderErrorKind::Transient => Self::TransientRender,
            RenderErrorKind::Permanent => Self::PermanentRender,
        }
    }
}

/// Terminal result of processing one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        url: String,
        rendered_key: String,
        content_length: Option<usize>,
        elapsed_ms: u64,
    },
    Failure {
        url: String,
        error_kind: ErrorKind,
        message: String,
        elapsed_ms: u64,
    },
}

impl FetchOutcome {
    #[must_use]
    pub fn failure(url: &str, error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            url: url.to_string(),
            error_kind,
            message: message.into(),
            elapsed_ms: 0,
        }
    }

    #[must_use]
    pub fn render_failure(url: &str, err: &RenderError) -> Self {
        Self::failure(url, ErrorKind::from(err), err.message.clone())
    }

    #[must_use]
    pub fn upload_failure(url: &str, err: &UploadError) -> Self {
        Self::failure(url, ErrorKind::Upload, err.to_string())
    }

    #[must_use]
    pub fn with_elapsed(self, elapsed_ms: u64) -> Self {
        match self {
            Self::Success {
                url,
                rendered_key,
                content_length,
                ..
            } => Self::Success {
                url,
                rendered_key,
                content_length,
                elapsed_ms,
            },
            Self::Failure {
                url,
                error_kind,
                message,
                ..
            } => Self::Failure {
                url,
                error_kind,
                message,
                elapsed_ms,
            },
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Success { url, .. } | Self::Failure { url, .. } => url,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { message, .. } => Some(message),
        }
    }
}

/// Overall status of a batch with at least one success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Complete,
    Partial,
}

impl BatchStatus {
    /// HTTP-style status code: 200 for full success, 207 for multi-status.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::Complete => 200,
            Self::Partial => 207,
        }
    }
}

/// Outcomes of one invocation, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub total_count: usize,
    pub success_count: usize,
    pub outcomes: Vec<FetchOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<FetchOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            total_count: outcomes.len(),
            success_count,
            outcomes,
        }
    }

    /// `None` when nothing succeeded.
    #[must_use]
    pub fn status(&self) -> Option<BatchStatus> {
        if self.success_count == 0 {
            None
        } else if self.success_count == self.total_count {
            Some(BatchStatus::Complete)
        } else {
            Some(BatchStatus::Partial)
        }
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.total_count - self.success_count
    }

    /// First failure message in input order.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.outcomes.iter().find_map(FetchOutcome::error_message)
    }
}

/// One entry of the `results` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    pub elapsed_ms: u64,
}

impl From<&FetchOutcome> for ResultEntry {
    fn from(outcome: &FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Success {
                url,
                rendered_key,
                content_length,
                elapsed_ms,
            } => Self {
                url: url.clone(),
                key: Some(rendered_key.clone()),
                status: "ok",
                error_kind: None,
                error: None,
                content_length: *content_length,
                elapsed_ms: *elapsed_ms,
            },
            FetchOutcome::Failure {
                url,
                error_kind,
                message,
                elapsed_ms,
            } => Self {
                url: url.clone(),
                key: None,
                status: "error",
                error_kind: Some(*error_kind),
                error: Some(message.clone()),
                content_length: None,
                elapsed_ms: *elapsed_ms,
            },
        }
    }
}

/// Structured result returned to the invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub message: String,
    pub bucket_name: String,
    pub success_count: usize,
    pub total_count: usize,
    pub results: Vec<ResultEntry>,
}

impl InvocationResponse {
    /// Build the response for a batch that has a status.
    #[must_use]
    pub fn new(report: &BatchReport, status: BatchStatus, bucket: &str) -> Self {
        let message = match status {
            BatchStatus::Complete => format!(
                "Rendered and uploaded all {} page(s)",
                report.total_count
            ),
            BatchStatus::Partial => format!(
                "Rendered and uploaded {} of {} page(s)",
                report.success_count, report.total_count
            ),
        };

        Self {
            status_code: status.status_code(),
            message,
            bucket_name: bucket.to_string(),
            success_count: report.success_count,
            total_count: report.total_count,
            results: report.outcomes.iter().map(ResultEntry::from).collect(),
        }
    }
}
