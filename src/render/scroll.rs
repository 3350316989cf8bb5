//! Incremental scroll-to-bottom for lazy-loaded content.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use super::RenderError;

/// Bounds for the scroll loop.
#[derive(Debug, Clone)]
pub struct ScrollPolicy {
    /// Pause after each scroll step so new content can load.
    pub pause: Duration,
    /// Maximum number of scroll steps.
    pub max_rounds: u32,
    /// Wall-clock budget for the whole loop.
    pub budget: Duration,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(3),
            max_rounds: 25,
            budget: Duration::from_secs(60),
        }
    }
}

/// Why the scroll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    /// Two consecutive height measurements matched.
    Stable,
    /// `max_rounds` reached before the height settled.
    RoundLimit,
    /// The time budget ran out before the height settled.
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSummary {
    pub rounds: u32,
    pub final_height: u64,
    pub stop: ScrollStop,
}

/// A scrollable document.
#[async_trait]
pub trait ScrollTarget: Send + Sync {
    /// Current scrollable height of the document.
    async fn scroll_height(&self) -> Result<u64, RenderError>;

    /// Scroll the viewport to the given vertical offset.
    async fn scroll_to(&self, y: u64) -> Result<(), RenderError>;
}

/// Scroll to the bottom repeatedly until the height stops changing.
///
/// The loop always terminates: it stops on a stable height, after
/// `policy.max_rounds` steps, or once `policy.budget` has elapsed.
///
/// # Errors
///
/// Propagates any error from the target.
pub async fn settle_scroll<T: ScrollTarget + ?Sized>(
    target: &T,
    policy: &ScrollPolicy,
) -> Result<ScrollSummary, RenderError> {
    let started = Instant::now();
    let mut height = target.scroll_height().await?;
    let mut rounds = 0;

    loop {
        if rounds >= policy.max_rounds {
            debug!(rounds, height, "Scroll round limit reached");
            return Ok(ScrollSummary {
                rounds,
                final_height: height,
                stop: ScrollStop::RoundLimit,
            });
        }
        if started.elapsed() >= policy.budget {
            debug!(rounds, height, "Scroll budget exhausted");
            return Ok(ScrollSummary {
                rounds,
                final_height: height,
                stop: ScrollStop::BudgetExhausted,
            });
        }

        target.scroll_to(height).await?;
        tokio::time::sleep(policy.pause).await;
        rounds += 1;

        let next = target.scroll_height().await?;
        if next == height {
            return Ok(ScrollSummary {
                rounds,
                final_height: height,
                stop: ScrollStop::Stable,
            });
        }
        height = next;
    }
}
