//! LogStore port - append-only per-task trail.

use async_trait::async_trait;

use super::task_store::StoreError;
use crate::domain::{LogEntry, LogFilter, LogLevel, TaskId};

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append_log(
        &self,
        task_id: TaskId,
        level: LogLevel,
        message: String,
    ) -> Result<LogEntry, StoreError>;

    /// Oldest first, so the trail reads in causal order.
    async fn list_logs(&self, filter: LogFilter) -> Result<Vec<LogEntry>, StoreError>;

    /// Returns the number of entries removed.
    async fn delete_logs(&self, task_id: TaskId) -> Result<usize, StoreError>;
}
