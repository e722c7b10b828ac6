//! TaskService - the request path in front of the store and the executor.
//!
//! Validates input against the domain rules and the configured bounds,
//! guards lifecycle operations by current status, and delegates start/cancel
//! to [`TaskExecutor`]. Every method returns synchronously with a typed
//! result; the outcome of a started task is observed through the store and
//! live updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::countdown::fire_instant;
use super::executor::{StartOutcome, TaskExecutor};
use super::stats::TaskStats;
use crate::domain::{
    ConfigId, ConfigPatch, Configuration, LogEntry, LogFilter, LogLevel, NewConfiguration,
    NewTask, Task, TaskBounds, TaskDefaults, TaskFilter, TaskId, TaskPatch, TaskStatus,
    ValidationError,
};
use crate::ports::{Clock, Ports, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Start(#[from] super::executor::StartError),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("configuration {0} not found")]
    ConfigurationNotFound(ConfigId),

    #[error("task {task_id} is {status}; only pending tasks can be changed or started")]
    NotPending { task_id: TaskId, status: TaskStatus },

    #[error("task {0} is already running")]
    AlreadyRunning(TaskId),

    #[error("task {task_id} already finished as {status}")]
    Terminal { task_id: TaskId, status: TaskStatus },

    #[error("task {task_id} is {status}; cancel it before deleting")]
    TaskActive { task_id: TaskId, status: TaskStatus },

    #[error("task {0} was cancelled but its last call has not returned yet")]
    CallInFlight(TaskId),

    #[error("configuration {config_id} is referenced by {tasks} task(s)")]
    ConfigurationInUse { config_id: ConfigId, tasks: usize },
}

/// Accepted start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReceipt {
    pub task_id: TaskId,
    pub target_time: DateTime<Utc>,
    /// Target minus network compensation.
    pub fire_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TaskService {
    ports: Ports,
    executor: TaskExecutor,
    defaults: TaskDefaults,
    bounds: TaskBounds,
}

impl TaskService {
    pub fn new(
        ports: Ports,
        executor: TaskExecutor,
        defaults: TaskDefaults,
        bounds: TaskBounds,
    ) -> Self {
        Self {
            ports,
            executor,
            defaults,
            bounds,
        }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    // ========================================
    // Configurations
    // ========================================

    pub async fn create_configuration(
        &self,
        new: NewConfiguration,
    ) -> Result<Configuration, ServiceError> {
        new.validate()?;
        let config = self.ports.configs.create_configuration(new).await?;
        tracing::info!(config_id = %config.id, name = %config.name, "configuration created");
        Ok(config)
    }

    pub async fn configuration(&self, id: ConfigId) -> Result<Configuration, ServiceError> {
        self.ports
            .configs
            .load_configuration(id)
            .await?
            .ok_or(ServiceError::ConfigurationNotFound(id))
    }

    pub async fn list_configurations(&self) -> Result<Vec<Configuration>, ServiceError> {
        Ok(self.ports.configs.list_configurations().await?)
    }

    pub async fn update_configuration(
        &self,
        id: ConfigId,
        patch: ConfigPatch,
    ) -> Result<Configuration, ServiceError> {
        patch.validate()?;
        self.configuration(id).await?;
        Ok(self.ports.configs.update_configuration(id, patch).await?)
    }

    /// Rejected while any task still references the configuration.
    pub async fn delete_configuration(&self, id: ConfigId) -> Result<(), ServiceError> {
        self.configuration(id).await?;
        let users = self
            .ports
            .tasks
            .list_tasks(TaskFilter::with_config(id))
            .await?
            .len();
        if users > 0 {
            return Err(ServiceError::ConfigurationInUse {
                config_id: id,
                tasks: users,
            });
        }
        self.ports.configs.delete_configuration(id).await?;
        tracing::info!(config_id = %id, "configuration deleted");
        Ok(())
    }

    // ========================================
    // Tasks
    // ========================================

    pub async fn create_task(&self, new: NewTask) -> Result<Task, ServiceError> {
        self.configuration(new.config_id).await?;
        let draft = new.resolve(&self.defaults, &self.bounds, self.ports.clock.now())?;
        let task = self.ports.tasks.create_task(draft).await?;
        tracing::info!(task_id = %task.id, target = %task.target_time, "task created");
        Ok(task)
    }

    pub async fn task(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.ports
            .tasks
            .load_task(id)
            .await?
            .ok_or(ServiceError::TaskNotFound(id))
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, ServiceError> {
        Ok(self.ports.tasks.list_tasks(filter).await?)
    }

    /// Only while Pending and not yet handed to the executor.
    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, ServiceError> {
        let task = self.task(id).await?;
        self.ensure_idle_pending(&task)?;
        patch.validate(&task, &self.bounds, self.ports.clock.now())?;
        if patch.is_empty() {
            return Ok(task);
        }
        Ok(self.ports.tasks.update_task(id, patch).await?)
    }

    /// # Validation
    /// - task exists and is Pending
    /// - target time is still in the future
    /// - no unit is tracked for it yet
    pub async fn start_task(&self, id: TaskId) -> Result<StartReceipt, ServiceError> {
        let task = self.task(id).await?;
        self.ensure_idle_pending(&task)?;

        let now = self.ports.clock.now();
        if task.target_time <= now {
            return Err(ValidationError::TargetNotInFuture {
                target: task.target_time,
                now,
            }
            .into());
        }

        match self.executor.start_task(id).await? {
            StartOutcome::Started => Ok(StartReceipt {
                task_id: id,
                target_time: task.target_time,
                fire_at: fire_instant(task.target_time, task.network_compensation()),
            }),
            StartOutcome::AlreadyRunning => Err(ServiceError::AlreadyRunning(id)),
        }
    }

    /// Stop the task and record it as Cancelled. Returns the final stored
    /// status, which is Completed or Failed if the executor got there first.
    pub async fn cancel_task(&self, id: TaskId) -> Result<TaskStatus, ServiceError> {
        let task = self.task(id).await?;
        if task.status.is_terminal() {
            return Err(ServiceError::Terminal {
                task_id: id,
                status: task.status,
            });
        }

        let was_running = self.executor.cancel_task(id).await;
        let status = match self
            .ports
            .tasks
            .update_task_status(id, TaskStatus::Cancelled, None)
            .await
        {
            Ok(task) => task.status,
            Err(StoreError::InvalidTransition { from, .. }) => {
                tracing::info!(task_id = %id, status = %from, "task finished before cancellation");
                return Ok(from);
            }
            Err(err) => return Err(err.into()),
        };

        self.ports
            .logs
            .append_log(id, LogLevel::Info, "task cancelled".to_string())
            .await?;
        tracing::info!(task_id = %id, was_running, "task cancelled");
        Ok(status)
    }

    /// Removes the task and its log trail. Rejected while it is executing
    /// or while a cancelled call is still outstanding.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), ServiceError> {
        let task = self.task(id).await?;
        if task.status.is_active() || self.executor.is_running(id) {
            return Err(ServiceError::TaskActive {
                task_id: id,
                status: task.status,
            });
        }
        if self.executor.is_draining(id) {
            return Err(ServiceError::CallInFlight(id));
        }

        if !self.ports.tasks.delete_task(id).await? {
            return Err(ServiceError::TaskNotFound(id));
        }
        let removed = self.ports.logs.delete_logs(id).await?;
        tracing::info!(task_id = %id, logs = removed, "task deleted");
        Ok(())
    }

    pub async fn stats(&self) -> Result<TaskStats, ServiceError> {
        let tasks = self.ports.tasks.list_tasks(TaskFilter::default()).await?;
        Ok(TaskStats::from_tasks(&tasks, self.executor.running_count()))
    }

    pub async fn logs(&self, filter: LogFilter) -> Result<Vec<LogEntry>, ServiceError> {
        Ok(self.ports.logs.list_logs(filter).await?)
    }

    fn ensure_idle_pending(&self, task: &Task) -> Result<(), ServiceError> {
        if task.status != TaskStatus::Pending {
            return Err(ServiceError::NotPending {
                task_id: task.id,
                status: task.status,
            });
        }
        if self.executor.is_running(task.id) {
            return Err(ServiceError::AlreadyRunning(task.id));
        }
        Ok(())
    }
}
