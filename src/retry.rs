//! Single bounded retry for transient browser-session failures.

use std::future::Future;

use tracing::warn;
use url::Url;

use crate::render::{HtmlDocument, RenderError, RenderOptions, Renderer};

/// Run `attempt` once, and once more only if the first failure is transient.
///
/// The closure receives the 1-based attempt number. A permanent failure, or a
/// second failure of any kind, is returned as is, so worst-case latency is two
/// attempts.
///
/// # Errors
///
/// Returns the error of the last attempt made.
pub async fn retry_transient_once<T, F, Fut>(mut attempt: F) -> Result<T, RenderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RenderError>>,
{
    match attempt(1).await {
        Err(e) if e.is_transient() => {
            warn!(error = %e, "Transient render failure, retrying once");
            attempt(2).await
        }
        other => other,
    }
}

/// Render `url`, retrying once with a fresh render on a transient failure.
///
/// # Errors
///
/// Returns the render error if the page could not be rendered.
pub async fn fetch_with_retry(
    renderer: &dyn Renderer,
    url: &Url,
    options: &RenderOptions,
) -> Result<HtmlDocument, RenderError> {
    retry_transient_once(|_| renderer.render(url, options)).await
}
