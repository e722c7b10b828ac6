//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// TaskStatus is the persisted lifecycle state of a task.
///
/// # Transitions
/// - Pending -> Countdown -> Running -> Completed
/// - Running -> Failed (retries exhausted)
/// - Pending / Countdown / Running -> Failed (unexpected fault in the execution unit)
/// - Pending / Countdown / Running -> Cancelled
///
/// Completed, Failed and Cancelled are terminal: nothing leaves them. The store
/// enforces this, so the first terminal write for a task wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Countdown,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Countdown,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Countdown or Running: an execution unit owns the task.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Countdown | TaskStatus::Running)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Countdown) => true,
            (Countdown, Running) => true,
            (Running, Completed) => true,
            (Pending | Countdown | Running, Failed) => true,
            (Pending | Countdown | Running, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Countdown => "countdown",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::start(TaskStatus::Pending, TaskStatus::Countdown)]
    #[case::fire(TaskStatus::Countdown, TaskStatus::Running)]
    #[case::success(TaskStatus::Running, TaskStatus::Completed)]
    #[case::exhausted(TaskStatus::Running, TaskStatus::Failed)]
    #[case::fault_in_countdown(TaskStatus::Countdown, TaskStatus::Failed)]
    #[case::cancel_pending(TaskStatus::Pending, TaskStatus::Cancelled)]
    #[case::cancel_countdown(TaskStatus::Countdown, TaskStatus::Cancelled)]
    #[case::cancel_running(TaskStatus::Running, TaskStatus::Cancelled)]
    fn allowed_edges(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case::skip_countdown(TaskStatus::Pending, TaskStatus::Running)]
    #[case::skip_running(TaskStatus::Countdown, TaskStatus::Completed)]
    #[case::backwards(TaskStatus::Running, TaskStatus::Countdown)]
    #[case::self_loop(TaskStatus::Running, TaskStatus::Running)]
    #[case::completed_to_cancelled(TaskStatus::Completed, TaskStatus::Cancelled)]
    #[case::cancelled_to_completed(TaskStatus::Cancelled, TaskStatus::Completed)]
    #[case::failed_to_pending(TaskStatus::Failed, TaskStatus::Pending)]
    fn rejected_edges(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in TaskStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in TaskStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!("countdown".parse::<TaskStatus>(), Ok(TaskStatus::Countdown));
        assert!("done".parse::<TaskStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&TaskStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
