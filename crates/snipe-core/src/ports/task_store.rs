//! TaskStore port - the durable record of tasks.
//!
//! The core only reads tasks and requests status updates; creation, patching
//! and deletion are driven by the request path (`TaskService`).
//!
//! # Contract
//! - Every method is atomic at the single-record level.
//! - `update_task_status` enforces [`TaskStatus::can_transition_to`] and
//!   stamps `started_at` / `completed_at`. Because terminal states have no
//!   exits, the first terminal write for a task wins.

use async_trait::async_trait;

use crate::domain::{ConfigId, Task, TaskDraft, TaskFilter, TaskId, TaskPatch, TaskStatus};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("task {task_id}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn task_not_found(id: TaskId) -> Self {
        StoreError::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }

    pub fn config_not_found(id: ConfigId) -> Self {
        StoreError::NotFound {
            kind: "configuration",
            id: id.to_string(),
        }
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task in Pending.
    async fn create_task(&self, draft: TaskDraft) -> Result<Task, StoreError>;

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Newest first.
    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, StoreError>;

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError>;

    /// Move `id` to `status`, replacing the result payload when one is given.
    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: Option<serde_json::Value>,
    ) -> Result<Task, StoreError>;

    /// Returns false when nothing was deleted.
    async fn delete_task(&self, id: TaskId) -> Result<bool, StoreError>;
}
