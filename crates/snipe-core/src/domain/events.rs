//! Live-update messages pushed to subscribers of a task's progress stream.
//!
//! Serialized with a `type` tag (`task_started`, `countdown`, ...). Every
//! variant carries `task_id` so a subscriber watching several tasks can route
//! messages without extra context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveUpdate {
    /// Greeting delivered to a single subscriber when it attaches.
    Connected { task_id: TaskId, message: String },

    TaskStarted {
        task_id: TaskId,
        target_time: DateTime<Utc>,
        message: String,
    },

    /// Remaining time until the compensated fire instant, in seconds.
    Countdown {
        task_id: TaskId,
        remaining: f64,
        message: String,
    },

    Executing { task_id: TaskId, message: String },

    Retry {
        task_id: TaskId,
        retry_count: u32,
        message: String,
        /// Structured failure payload (call returned ok=false).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        /// Error text (call itself failed).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Success {
        task_id: TaskId,
        message: String,
        result: serde_json::Value,
    },

    /// Retries exhausted. `result` is the last attempt's outcome.
    Failed {
        task_id: TaskId,
        message: String,
        result: serde_json::Value,
    },

    /// Unexpected fault in the execution unit.
    Error { task_id: TaskId, message: String },

    Cancelled { task_id: TaskId, message: String },

    /// Reply to a subscriber's liveness ping.
    Pong { task_id: TaskId },
}

impl LiveUpdate {
    pub fn task_id(&self) -> TaskId {
        match self {
            LiveUpdate::Connected { task_id, .. }
            | LiveUpdate::TaskStarted { task_id, .. }
            | LiveUpdate::Countdown { task_id, .. }
            | LiveUpdate::Executing { task_id, .. }
            | LiveUpdate::Retry { task_id, .. }
            | LiveUpdate::Success { task_id, .. }
            | LiveUpdate::Failed { task_id, .. }
            | LiveUpdate::Error { task_id, .. }
            | LiveUpdate::Cancelled { task_id, .. }
            | LiveUpdate::Pong { task_id } => *task_id,
        }
    }

    /// Wire name of the variant (the `type` tag).
    pub fn kind(&self) -> &'static str {
        match self {
            LiveUpdate::Connected { .. } => "connected",
            LiveUpdate::TaskStarted { .. } => "task_started",
            LiveUpdate::Countdown { .. } => "countdown",
            LiveUpdate::Executing { .. } => "executing",
            LiveUpdate::Retry { .. } => "retry",
            LiveUpdate::Success { .. } => "success",
            LiveUpdate::Failed { .. } => "failed",
            LiveUpdate::Error { .. } => "error",
            LiveUpdate::Cancelled { .. } => "cancelled",
            LiveUpdate::Pong { .. } => "pong",
        }
    }

    /// Last message a task's stream will carry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LiveUpdate::Success { .. }
                | LiveUpdate::Failed { .. }
                | LiveUpdate::Error { .. }
                | LiveUpdate::Cancelled { .. }
        )
    }

    pub fn countdown(task_id: TaskId, remaining: std::time::Duration) -> Self {
        let secs = remaining.as_secs_f64();
        LiveUpdate::Countdown {
            task_id,
            remaining: secs,
            message: format!("{secs:.3}s remaining"),
        }
    }
}
