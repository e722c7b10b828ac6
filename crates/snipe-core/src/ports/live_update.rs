//! LiveUpdateSink port - per-task multicast of progress messages.
//!
//! # Contract
//! - Publishing to a task with no subscribers is a no-op.
//! - Publishing never fails from the caller's point of view; delivery
//!   problems with individual subscribers are the transport's concern.
//! - Messages published for one task id reach subscribers in publish order.

use async_trait::async_trait;

use crate::domain::{LiveUpdate, TaskId};

#[async_trait]
pub trait LiveUpdateSink: Send + Sync {
    async fn publish(&self, task_id: TaskId, message: LiveUpdate);

    fn subscriber_count(&self, task_id: TaskId) -> usize;
}
