//! Task records and the rules for creating / patching them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::ValidationError;
use super::ids::{ConfigId, TaskId};
use super::state::TaskStatus;

/// A single scheduled purchase attempt, as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub config_id: ConfigId,

    /// Vendor-opaque identifier of the thing being redeemed.
    pub redeem_target: String,

    pub target_time: DateTime<Utc>,
    pub network_compensation_ms: u64,
    pub max_retries: u32,
    pub retry_interval_ms: u64,

    pub status: TaskStatus,

    /// Outcome details on success, or the last error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn network_compensation(&self) -> Duration {
        Duration::from_millis(self.network_compensation_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Create request. Omitted numeric fields fall back to [`TaskDefaults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub config_id: ConfigId,
    pub redeem_target: String,
    pub target_time: DateTime<Utc>,
    #[serde(default)]
    pub network_compensation_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_interval_ms: Option<u64>,
}

impl NewTask {
    pub fn new(
        config_id: ConfigId,
        redeem_target: impl Into<String>,
        target_time: DateTime<Utc>,
    ) -> Self {
        Self {
            config_id,
            redeem_target: redeem_target.into(),
            target_time,
            network_compensation_ms: None,
            max_retries: None,
            retry_interval_ms: None,
        }
    }

    pub fn with_compensation_ms(mut self, ms: u64) -> Self {
        self.network_compensation_ms = Some(ms);
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn with_retry_interval_ms(mut self, ms: u64) -> Self {
        self.retry_interval_ms = Some(ms);
        self
    }

    /// Apply defaults and check every field against `bounds`.
    pub fn resolve(
        self,
        defaults: &TaskDefaults,
        bounds: &TaskBounds,
        now: DateTime<Utc>,
    ) -> Result<TaskDraft, ValidationError> {
        if self.redeem_target.trim().is_empty() {
            return Err(ValidationError::EmptyTarget);
        }
        ensure_future(self.target_time, now)?;

        let draft = TaskDraft {
            config_id: self.config_id,
            redeem_target: self.redeem_target,
            target_time: self.target_time,
            network_compensation_ms: self
                .network_compensation_ms
                .unwrap_or(defaults.network_compensation_ms),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_interval_ms: self.retry_interval_ms.unwrap_or(defaults.retry_interval_ms),
        };
        bounds.check(
            draft.network_compensation_ms,
            draft.max_retries,
            draft.retry_interval_ms,
        )?;
        Ok(draft)
    }
}

/// Fully resolved, validated task fields. The store assigns id, status and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub config_id: ConfigId,
    pub redeem_target: String,
    pub target_time: DateTime<Utc>,
    pub network_compensation_ms: u64,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
}

/// Partial update; only allowed while the task is Pending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub target_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub network_compensation_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_interval_ms: Option<u64>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.target_time.is_none()
            && self.network_compensation_ms.is_none()
            && self.max_retries.is_none()
            && self.retry_interval_ms.is_none()
    }

    /// Validate the patch as it would apply to `current`.
    pub fn validate(
        &self,
        current: &Task,
        bounds: &TaskBounds,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if let Some(target) = self.target_time {
            ensure_future(target, now)?;
        }
        bounds.check(
            self.network_compensation_ms
                .unwrap_or(current.network_compensation_ms),
            self.max_retries.unwrap_or(current.max_retries),
            self.retry_interval_ms.unwrap_or(current.retry_interval_ms),
        )
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(target) = self.target_time {
            task.target_time = target;
        }
        if let Some(ms) = self.network_compensation_ms {
            task.network_compensation_ms = ms;
        }
        if let Some(n) = self.max_retries {
            task.max_retries = n;
        }
        if let Some(ms) = self.retry_interval_ms {
            task.retry_interval_ms = ms;
        }
    }
}

/// Store query filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub config_id: Option<ConfigId>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_config(config_id: ConfigId) -> Self {
        Self {
            config_id: Some(config_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| s == task.status)
            && self.config_id.is_none_or(|c| c == task.config_id)
    }
}

/// Values used when a create request leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefaults {
    pub network_compensation_ms: u64,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            network_compensation_ms: 200,
            max_retries: 3,
            retry_interval_ms: 500,
        }
    }
}

/// Upper bounds for the tunable task fields. `max_retries` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskBounds {
    pub max_compensation_ms: u64,
    pub max_retries: u32,
    pub max_retry_interval_ms: u64,
}

impl Default for TaskBounds {
    fn default() -> Self {
        Self {
            max_compensation_ms: 2_000,
            max_retries: 20,
            max_retry_interval_ms: 5_000,
        }
    }
}

impl TaskBounds {
    pub fn check(
        &self,
        compensation_ms: u64,
        max_retries: u32,
        retry_interval_ms: u64,
    ) -> Result<(), ValidationError> {
        in_range("network_compensation_ms", compensation_ms, 0, self.max_compensation_ms)?;
        in_range("max_retries", u64::from(max_retries), 1, u64::from(self.max_retries))?;
        in_range(
            "retry_interval_ms",
            retry_interval_ms,
            0,
            self.max_retry_interval_ms,
        )
    }
}

fn in_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn ensure_future(target: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if target > now {
        Ok(())
    } else {
        Err(ValidationError::TargetNotInFuture { target, now })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn new_task(offset_secs: i64) -> NewTask {
        NewTask::new(
            ConfigId::from_ulid(Ulid::new()),
            "8a6d71f",
            now() + TimeDelta::seconds(offset_secs),
        )
    }

    #[test]
    fn resolve_fills_defaults() {
        let draft = new_task(60)
            .resolve(&TaskDefaults::default(), &TaskBounds::default(), now())
            .unwrap();
        assert_eq!(draft.network_compensation_ms, 200);
        assert_eq!(draft.max_retries, 3);
        assert_eq!(draft.retry_interval_ms, 500);
    }

    #[test]
    fn resolve_rejects_past_and_present_targets() {
        for offset in [0, -1] {
            let err = new_task(offset)
                .resolve(&TaskDefaults::default(), &TaskBounds::default(), now())
                .unwrap_err();
            assert!(matches!(err, ValidationError::TargetNotInFuture { .. }));
        }
    }

    #[test]
    fn resolve_rejects_zero_retries_and_oversized_fields() {
        let err = new_task(60)
            .with_max_retries(0)
            .resolve(&TaskDefaults::default(), &TaskBounds::default(), now())
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OutOfRange { field: "max_retries", .. }
        ));

        let err = new_task(60)
            .with_compensation_ms(2_001)
            .resolve(&TaskDefaults::default(), &TaskBounds::default(), now())
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OutOfRange { field: "network_compensation_ms", .. }
        ));
    }

    #[test]
    fn patch_validates_against_current_values() {
        let draft = new_task(60)
            .resolve(&TaskDefaults::default(), &TaskBounds::default(), now())
            .unwrap();
        let mut task = Task {
            id: TaskId::from_ulid(Ulid::new()),
            config_id: draft.config_id,
            redeem_target: draft.redeem_target,
            target_time: draft.target_time,
            network_compensation_ms: draft.network_compensation_ms,
            max_retries: draft.max_retries,
            retry_interval_ms: draft.retry_interval_ms,
            status: TaskStatus::Pending,
            result: None,
            created_at: now(),
            started_at: None,
            completed_at: None,
        };

        let patch = TaskPatch {
            target_time: Some(now() - TimeDelta::seconds(5)),
            ..TaskPatch::default()
        };
        assert!(patch.validate(&task, &TaskBounds::default(), now()).is_err());

        let patch = TaskPatch {
            retry_interval_ms: Some(1_000),
            ..TaskPatch::default()
        };
        patch.validate(&task, &TaskBounds::default(), now()).unwrap();
        patch.apply(&mut task);
        assert_eq!(task.retry_interval(), Duration::from_millis(1_000));
        assert_eq!(task.max_retries, 3);
    }
}
