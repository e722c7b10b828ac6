//! InMemoryStore - process-local TaskStore + ConfigStore + LogStore.
//!
//! Used by tests and by the CLI. Every record lives behind one async mutex,
//! which makes each operation atomic at the record level (and across records,
//! which the contract does not require but costs nothing here).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{
    ConfigId, ConfigPatch, Configuration, LogEntry, LogFilter, LogLevel, NewConfiguration, Task,
    TaskDraft, TaskFilter, TaskId, TaskPatch, TaskStatus,
};
use crate::ports::{
    Clock, ConfigStore, IdGenerator, LogStore, StoreError, SystemClock, TaskStore, UlidGenerator,
};

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Task>,
    configs: HashMap<ConfigId, Configuration>,
    logs: Vec<LogEntry>,
}

pub struct InMemoryStore {
    state: Mutex<State>,
    ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Timestamps and id ordering follow `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            ids: Box::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn create_task(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let task = Task {
            id: self.ids.generate_task_id(),
            config_id: draft.config_id,
            redeem_target: draft.redeem_target,
            target_time: draft.target_time,
            network_compensation_ms: draft.network_compensation_ms,
            max_retries: draft.max_retries,
            retry_interval_ms: draft.retry_interval_ms,
            status: TaskStatus::Pending,
            result: None,
            created_at: self.clock.now(),
            started_at: None,
            completed_at: None,
        };
        self.state.lock().await.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = filter.limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::task_not_found(id))?;
        patch.apply(task);
        Ok(task.clone())
    }

    /// # Implementation
    /// 1. Reject transitions the status machine does not allow
    /// 2. Stamp `started_at` on the first entry to Running
    /// 3. Stamp `completed_at` on entry to a terminal status
    /// 4. Replace `result` only when one is supplied
    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: Option<serde_json::Value>,
    ) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::task_not_found(id))?;

        if !task.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                task_id: id,
                from: task.status,
                to: status,
            });
        }

        task.status = status;
        if status == TaskStatus::Running && task.started_at.is_none() {
            task.started_at = Some(now);
        }
        if status.is_terminal() {
            task.completed_at = Some(now);
        }
        if result.is_some() {
            task.result = result;
        }
        tracing::debug!(task_id = %id, %status, "task status updated");
        Ok(task.clone())
    }

    async fn delete_task(&self, id: TaskId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.tasks.remove(&id).is_some())
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn create_configuration(
        &self,
        new: NewConfiguration,
    ) -> Result<Configuration, StoreError> {
        let mut state = self.state.lock().await;
        if state.configs.values().any(|c| c.name == new.name) {
            return Err(StoreError::Conflict(format!(
                "configuration name {:?} already exists",
                new.name
            )));
        }

        let now = self.clock.now();
        let config = Configuration {
            id: self.ids.generate_config_id(),
            name: new.name,
            headers: new.headers,
            created_at: now,
            updated_at: now,
        };
        state.configs.insert(config.id, config.clone());
        Ok(config)
    }

    async fn load_configuration(
        &self,
        id: ConfigId,
    ) -> Result<Option<Configuration>, StoreError> {
        Ok(self.state.lock().await.configs.get(&id).cloned())
    }

    async fn list_configurations(&self) -> Result<Vec<Configuration>, StoreError> {
        let mut configs: Vec<Configuration> =
            self.state.lock().await.configs.values().cloned().collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(configs)
    }

    async fn update_configuration(
        &self,
        id: ConfigId,
        patch: ConfigPatch,
    ) -> Result<Configuration, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if let Some(name) = &patch.name
            && state.configs.values().any(|c| c.id != id && &c.name == name)
        {
            return Err(StoreError::Conflict(format!(
                "configuration name {name:?} already exists"
            )));
        }

        let config = state
            .configs
            .get_mut(&id)
            .ok_or_else(|| StoreError::config_not_found(id))?;
        patch.apply(config);
        config.updated_at = now;
        Ok(config.clone())
    }

    async fn delete_configuration(&self, id: ConfigId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.configs.remove(&id).is_some())
    }
}

#[async_trait]
impl LogStore for InMemoryStore {
    async fn append_log(
        &self,
        task_id: TaskId,
        level: LogLevel,
        message: String,
    ) -> Result<LogEntry, StoreError> {
        let entry = LogEntry {
            id: self.ids.generate_log_id(),
            task_id,
            level,
            message,
            created_at: self.clock.now(),
        };
        self.state.lock().await.logs.push(entry.clone());
        Ok(entry)
    }

    async fn list_logs(&self, filter: LogFilter) -> Result<Vec<LogEntry>, StoreError> {
        let state = self.state.lock().await;
        let matching = state.logs.iter().filter(|e| filter.matches(e)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn delete_logs(&self, task_id: TaskId) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.logs.len();
        state.logs.retain(|e| e.task_id != task_id);
        Ok(before - state.logs.len())
    }
}
