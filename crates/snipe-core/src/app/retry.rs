//! Retry policy: how many attempts, and how long to wait between them.

use std::time::Duration;

use crate::domain::Task;

/// Maximum number of characters of a failure payload copied into log lines.
pub const DETAIL_LIMIT: usize = 200;

/// Bounded, fixed-interval retry policy for one task.
///
/// Attempts are strictly sequential. Duplicate concurrent submissions against
/// a purchase endpoint risk double charges or lockouts, so there is never more
/// than one call in flight per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always >= 1.
    pub max_retries: u32,

    /// Pause after a failed attempt.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            interval,
        }
    }

    pub fn for_task(task: &Task) -> Self {
        Self::new(task.max_retries, task.retry_interval())
    }

    /// Should attempt number `attempt` (1-indexed) be followed by another?
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Cut `detail` to [`DETAIL_LIMIT`] characters, on a char boundary.
pub fn truncate_detail(detail: &str) -> &str {
    match detail.char_indices().nth(DETAIL_LIMIT) {
        Some((idx, _)) => &detail[..idx],
        None => detail,
    }
}
