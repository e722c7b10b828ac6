//! TaskExecutor - one supervised unit of work per started task.
//!
//! # Flow
//! 1. `start_task` loads the task and its configuration, registers a
//!    cancellation token under the task id and spawns the unit.
//! 2. The unit publishes `task_started`, persists Countdown and runs a
//!    [`PrecisionCountdown`], forwarding every tick as a `countdown` message.
//! 3. At zero it persists Running, publishes `executing` and runs the bounded
//!    retry loop against the [`RedeemClient`](crate::ports::RedeemClient).
//! 4. Success persists Completed; exhaustion persists Failed with the last
//!    attempt's outcome; a store failure anywhere persists Failed with the
//!    error text.
//!
//! # Registry
//! Running units live in a map owned by the executor instance (not a
//! process-wide global). At most one unit exists per task id. A unit removes
//! its own entry when it ends, however it ends, through a drop guard that
//! checks the entry's generation so it never removes a newer registration.
//!
//! # Cancellation
//! `cancel_task` cancels the unit's token. The countdown and the pause between
//! attempts wake up immediately; a call already in flight is allowed to finish
//! (aborting it would leave the purchase in an unknown state). Such a unit
//! leaves the registry but stays in a draining set until its call returns;
//! `shutdown` waits for both. Once the unit observes cancellation it writes
//! no further status: the caller that requested cancellation owns the
//! Cancelled write.

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::countdown::{CountdownHandle, CountdownOutcome, PrecisionCountdown};
use super::retry::{RetryPolicy, truncate_detail};
use crate::domain::{
    CallOutcome, ConfigId, Configuration, LiveUpdate, LogLevel, Task, TaskId, TaskStatus,
};
use crate::ports::{Ports, RedeemError, StoreError};

/// Result of a start request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A unit for this id is already tracked; nothing was spawned.
    AlreadyRunning,
}

/// Start request failures. Nothing is spawned and no status is written.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("configuration {config_id} for task {task_id} not found")]
    ConfigurationNotFound { task_id: TaskId, config_id: ConfigId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    ports: Ports,
    running: Mutex<HashMap<TaskId, RunningUnit>>,
    /// Cancelled units still finishing, keyed by generation.
    /// Lock order: `running` before `draining`.
    draining: Mutex<HashMap<u64, DrainingUnit>>,
    generations: AtomicU64,
}

struct RunningUnit {
    generation: u64,
    cancel: CancellationToken,
    countdown: Option<CountdownHandle>,
    join: JoinHandle<()>,
}

struct DrainingUnit {
    task_id: TaskId,
    join: JoinHandle<()>,
}

impl Inner {
    fn running(&self) -> MutexGuard<'_, HashMap<TaskId, RunningUnit>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn draining(&self) -> MutexGuard<'_, HashMap<u64, DrainingUnit>> {
        self.draining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach_countdown(&self, task_id: TaskId, generation: u64, handle: CountdownHandle) {
        if let Some(unit) = self.running().get_mut(&task_id)
            && unit.generation == generation
        {
            unit.countdown = Some(handle);
        }
    }

    fn release(&self, task_id: TaskId, generation: u64) {
        let mut running = self.running();
        if running
            .get(&task_id)
            .is_some_and(|unit| unit.generation == generation)
        {
            running.remove(&task_id);
            tracing::debug!(%task_id, generation, "execution unit released");
        }
        if self.draining().remove(&generation).is_some() {
            tracing::debug!(%task_id, generation, "cancelled unit drained");
        }
    }
}

impl TaskExecutor {
    pub fn new(ports: Ports) -> Self {
        Self {
            inner: Arc::new(Inner {
                ports,
                running: Mutex::new(HashMap::new()),
                draining: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Spawn the execution unit for `task_id` and return immediately.
    ///
    /// The returned value reports whether spawning happened, not how the
    /// purchase ends; that is observable through the store and live updates.
    pub async fn start_task(&self, task_id: TaskId) -> Result<StartOutcome, StartError> {
        if self.is_running(task_id) {
            tracing::warn!(%task_id, "task already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let ports = &self.inner.ports;
        let task = ports
            .tasks
            .load_task(task_id)
            .await?
            .ok_or(StartError::TaskNotFound(task_id))?;
        let config = ports
            .configs
            .load_configuration(task.config_id)
            .await?
            .ok_or(StartError::ConfigurationNotFound {
                task_id,
                config_id: task.config_id,
            })?;

        let mut running = self.inner.running();
        // re-check: another start may have registered while we were loading
        if running.contains_key(&task_id) {
            tracing::warn!(%task_id, "task already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let unit = ExecutionUnit {
            inner: Arc::clone(&self.inner),
            task,
            config,
            cancel: cancel.clone(),
            generation,
        };
        let span = tracing::info_span!("task", %task_id);
        let join = tokio::spawn(unit.run().instrument(span));
        running.insert(
            task_id,
            RunningUnit {
                generation,
                cancel,
                countdown: None,
                join,
            },
        );

        tracing::info!(%task_id, generation, "task started");
        Ok(StartOutcome::Started)
    }

    /// Stop the unit for `task_id`, if any, and publish `cancelled`.
    ///
    /// Returns whether a unit was tracked. Does not write task status.
    /// A call already in flight keeps the unit draining until it returns.
    pub async fn cancel_task(&self, task_id: TaskId) -> bool {
        let found = {
            let mut running = self.inner.running();
            match running.remove(&task_id) {
                Some(unit) => {
                    if let Some(countdown) = &unit.countdown {
                        countdown.cancel();
                    }
                    unit.cancel.cancel();
                    self.inner.draining().insert(
                        unit.generation,
                        DrainingUnit {
                            task_id,
                            join: unit.join,
                        },
                    );
                    true
                }
                None => false,
            }
        };
        tracing::info!(%task_id, found, "task cancelled");

        self.inner
            .ports
            .updates
            .publish(
                task_id,
                LiveUpdate::Cancelled {
                    task_id,
                    message: "task cancelled".to_string(),
                },
            )
            .await;
        found
    }

    pub fn is_running(&self, task_id: TaskId) -> bool {
        self.inner.running().contains_key(&task_id)
    }

    pub fn running_count(&self) -> usize {
        self.inner.running().len()
    }

    /// Whether a cancelled unit for `task_id` is still finishing its call.
    pub fn is_draining(&self, task_id: TaskId) -> bool {
        self.inner
            .draining()
            .values()
            .any(|unit| unit.task_id == task_id)
    }

    pub fn draining_count(&self) -> usize {
        self.inner.draining().len()
    }

    /// Time left on the countdown of a tracked task. `None` when the task is
    /// not tracked or its countdown has not been set up yet.
    pub fn remaining(&self, task_id: TaskId) -> Option<Duration> {
        self.inner
            .running()
            .get(&task_id)
            .and_then(|unit| unit.countdown.as_ref())
            .map(CountdownHandle::remaining)
    }

    /// Cancel every tracked unit and wait for them, and for units cancelled
    /// earlier that are still draining, to finish.
    pub async fn shutdown(&self) {
        let units: Vec<RunningUnit> = self.inner.running().drain().map(|(_, u)| u).collect();
        let draining: Vec<DrainingUnit> =
            self.inner.draining().drain().map(|(_, u)| u).collect();
        tracing::info!(
            units = units.len(),
            draining = draining.len(),
            "executor shutting down"
        );

        for unit in &units {
            unit.cancel.cancel();
        }
        let joins = units
            .into_iter()
            .map(|u| u.join)
            .chain(draining.into_iter().map(|u| u.join));
        for join in joins {
            if let Err(err) = join.await {
                tracing::warn!(error = %err, "execution unit did not finish cleanly");
            }
        }
    }
}

/// Removes the registry entry when the unit ends (including on panic).
struct Registration {
    inner: Arc<Inner>,
    task_id: TaskId,
    generation: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.inner.release(self.task_id, self.generation);
    }
}

struct ExecutionUnit {
    inner: Arc<Inner>,
    task: Task,
    config: Configuration,
    cancel: CancellationToken,
    generation: u64,
}

impl ExecutionUnit {
    fn ports(&self) -> &Ports {
        &self.inner.ports
    }

    fn id(&self) -> TaskId {
        self.task.id
    }

    async fn run(self) {
        let _registration = Registration {
            inner: Arc::clone(&self.inner),
            task_id: self.id(),
            generation: self.generation,
        };

        if let Err(fault) = self.drive().await {
            self.report_fault(fault).await;
        }
    }

    async fn drive(&self) -> Result<(), StoreError> {
        let id = self.id();
        let ports = self.ports();

        self.log(
            LogLevel::Info,
            format!(
                "task started, target {}, network compensation {}ms",
                self.task.target_time.to_rfc3339(),
                self.task.network_compensation_ms
            ),
        )
        .await?;
        ports
            .updates
            .publish(
                id,
                LiveUpdate::TaskStarted {
                    task_id: id,
                    target_time: self.task.target_time,
                    message: "task started, counting down".to_string(),
                },
            )
            .await;

        let countdown = PrecisionCountdown::new(
            self.task.target_time,
            self.task.network_compensation(),
            || self.redeem(),
        )
        .with_clock(Arc::clone(&ports.clock))
        .with_cancellation(self.cancel.child_token());
        self.inner
            .attach_countdown(id, self.generation, countdown.handle());

        ports
            .tasks
            .update_task_status(id, TaskStatus::Countdown, None)
            .await?;
        tracing::info!(fire_at = %countdown.fire_at(), "countdown started");

        let updates = Arc::clone(&ports.updates);
        let outcome = countdown
            .run(move |remaining| {
                let updates = Arc::clone(&updates);
                async move {
                    tracing::trace!(remaining_ms = remaining.as_millis() as u64, "tick");
                    updates
                        .publish(id, LiveUpdate::countdown(id, remaining))
                        .await;
                }
            })
            .await;

        match outcome {
            CountdownOutcome::Fired(result) => result,
            CountdownOutcome::Cancelled => {
                tracing::info!("countdown cancelled");
                Ok(())
            }
        }
    }

    /// The bounded retry loop. Call failures never escape it; only store
    /// failures do.
    async fn redeem(&self) -> Result<(), StoreError> {
        let id = self.id();
        let ports = self.ports();
        let policy = RetryPolicy::for_task(&self.task);

        self.log(
            LogLevel::Info,
            format!(
                "countdown finished, executing (max retries {}, interval {}ms)",
                policy.max_retries,
                policy.interval.as_millis()
            ),
        )
        .await?;
        ports
            .tasks
            .update_task_status(id, TaskStatus::Running, None)
            .await?;
        ports
            .updates
            .publish(
                id,
                LiveUpdate::Executing {
                    task_id: id,
                    message: "executing".to_string(),
                },
            )
            .await;

        let mut attempt = 0;
        let mut last_result = serde_json::Value::Null;
        while attempt < policy.max_retries {
            if self.cancel.is_cancelled() {
                tracing::info!(attempt, "retry loop cancelled");
                return Ok(());
            }
            attempt += 1;

            let call = ports
                .client
                .call(&self.task.redeem_target, &self.config.headers)
                .await;
            if self.cancel.is_cancelled() {
                return self.record_late_outcome(attempt, &call).await;
            }

            match call {
                Ok(outcome) if outcome.ok => return self.complete(attempt, outcome.payload).await,
                Ok(outcome) => {
                    let detail = outcome.payload.to_string();
                    tracing::warn!(attempt, detail = truncate_detail(&detail), "attempt failed");
                    self.log(
                        LogLevel::Warning,
                        format!(
                            "attempt {attempt}/{} failed: {}",
                            policy.max_retries,
                            truncate_detail(&detail)
                        ),
                    )
                    .await?;
                    ports
                        .updates
                        .publish(
                            id,
                            LiveUpdate::Retry {
                                task_id: id,
                                retry_count: attempt,
                                message: format!("attempt {attempt} failed"),
                                result: Some(outcome.payload.clone()),
                                error: None,
                            },
                        )
                        .await;
                    last_result = outcome.payload;
                }
                Err(err) => {
                    let detail = err.to_string();
                    tracing::error!(attempt, error = %detail, "attempt raised");
                    self.log(
                        LogLevel::Error,
                        format!("attempt {attempt}/{} raised: {detail}", policy.max_retries),
                    )
                    .await?;
                    ports
                        .updates
                        .publish(
                            id,
                            LiveUpdate::Retry {
                                task_id: id,
                                retry_count: attempt,
                                message: format!("attempt {attempt} raised: {detail}"),
                                result: None,
                                error: Some(detail.clone()),
                            },
                        )
                        .await;
                    last_result = json!({ "error": detail });
                }
            }

            if policy.has_next(attempt) && !self.pause(policy.interval).await {
                tracing::info!(attempt, "retry loop cancelled during pause");
                return Ok(());
            }
        }

        self.exhaust(policy, last_result).await
    }

    async fn complete(&self, attempt: u32, payload: serde_json::Value) -> Result<(), StoreError> {
        let id = self.id();
        let ports = self.ports();

        let stored = ports
            .tasks
            .update_task_status(
                id,
                TaskStatus::Completed,
                Some(json!({ "success": true, "attempts": attempt, "result": payload })),
            )
            .await;
        match stored {
            Ok(_) => {}
            // cancelled between the call returning and this write
            Err(StoreError::InvalidTransition { from, .. }) if from.is_terminal() => {
                tracing::warn!(%from, attempt, "success arrived after the task was closed");
                return self
                    .record_late_outcome(attempt, &Ok(CallOutcome::success(payload)))
                    .await;
            }
            Err(err) => return Err(err),
        }
        ports
            .updates
            .publish(
                id,
                LiveUpdate::Success {
                    task_id: id,
                    message: format!("redeemed on attempt {attempt}"),
                    result: payload,
                },
            )
            .await;
        self.log(LogLevel::Info, format!("redeemed on attempt {attempt}"))
            .await?;
        tracing::info!(attempt, "task completed");
        Ok(())
    }

    async fn exhaust(
        &self,
        policy: RetryPolicy,
        last_result: serde_json::Value,
    ) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let id = self.id();
        let ports = self.ports();
        let detail = last_result.to_string();

        ports
            .tasks
            .update_task_status(
                id,
                TaskStatus::Failed,
                Some(json!({
                    "success": false,
                    "retries": policy.max_retries,
                    "last_result": last_result,
                })),
            )
            .await?;
        self.log(
            LogLevel::Error,
            format!(
                "all {} attempts failed, last result: {}",
                policy.max_retries,
                truncate_detail(&detail)
            ),
        )
        .await?;
        ports
            .updates
            .publish(
                id,
                LiveUpdate::Failed {
                    task_id: id,
                    message: format!("failed after {} attempts", policy.max_retries),
                    result: last_result,
                },
            )
            .await;
        tracing::error!(retries = policy.max_retries, last_result = %truncate_detail(&detail), "task failed");
        Ok(())
    }

    /// An attempt that was in flight when cancellation arrived. Its outcome
    /// goes to the log only; status is left to the cancelling caller.
    async fn record_late_outcome(
        &self,
        attempt: u32,
        call: &Result<CallOutcome, RedeemError>,
    ) -> Result<(), StoreError> {
        let detail = match call {
            Ok(outcome) => format!("ok={} {}", outcome.ok, outcome.payload),
            Err(err) => err.to_string(),
        };
        tracing::warn!(attempt, detail = truncate_detail(&detail), "attempt finished after cancellation");
        self.log(
            LogLevel::Warning,
            format!(
                "attempt {attempt} finished after cancellation: {}",
                truncate_detail(&detail)
            ),
        )
        .await
    }

    /// Sleep between attempts. False when cancelled first.
    async fn pause(&self, interval: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(interval) => true,
        }
    }

    async fn report_fault(&self, fault: StoreError) {
        if self.cancel.is_cancelled() {
            tracing::info!(error = %fault, "fault after cancellation ignored");
            return;
        }
        let id = self.id();
        let ports = self.ports();
        let detail = fault.to_string();
        tracing::error!(error = %detail, "execution unit failed");

        if let Err(err) = ports
            .tasks
            .update_task_status(id, TaskStatus::Failed, Some(json!({ "error": detail })))
            .await
        {
            tracing::error!(error = %err, "could not mark task failed");
        }
        ports
            .updates
            .publish(
                id,
                LiveUpdate::Error {
                    task_id: id,
                    message: format!("execution failed: {detail}"),
                },
            )
            .await;
        if let Err(err) = self
            .log(LogLevel::Error, format!("execution failed: {detail}"))
            .await
        {
            tracing::error!(error = %err, "could not append failure log");
        }
    }

    async fn log(&self, level: LogLevel, message: String) -> Result<(), StoreError> {
        self.ports()
            .logs
            .append_log(self.id(), level, message)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::SubscriptionEvent;
    use crate::ports::{ConfigStore, TaskStore};
    use crate::test_support::{Harness, Script};
    use chrono::TimeDelta;

    #[tokio::test(start_paused = true)]
    async fn fails_twice_then_succeeds() {
        let h = Harness::new();
        h.client
            .script([Script::Fail, Script::Fail, Script::Succeed]);
        let task = h
            .task(TimeDelta::seconds(3), |t| {
                t.with_compensation_ms(200)
                    .with_max_retries(3)
                    .with_retry_interval_ms(500)
            })
            .await;
        let mut sub = h.hub.attach(task.id);

        assert_eq!(
            h.executor.start_task(task.id).await.unwrap(),
            StartOutcome::Started
        );
        let kinds = h.drain(&mut sub).await;

        let countdowns = kinds.iter().filter(|k| *k == "countdown").count();
        assert!(countdowns > 0);
        let expected_tail = ["executing", "retry", "retry", "success"];
        assert_eq!(&kinds[..2], ["connected", "task_started"]);
        assert_eq!(&kinds[kinds.len() - 4..], expected_tail);
        assert_eq!(kinds.len(), 2 + countdowns + expected_tail.len());

        assert_eq!(h.client.calls(), 3);
        let stored = h.load(task.id).await;
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.result.as_ref().unwrap()["success"], true);
        assert!(stored.started_at.is_some());
        assert!(stored.completed_at.is_some());

        h.settle().await;
        assert!(!h.executor.is_running(task.id));
    }

    #[tokio::test(start_paused = true)]
    async fn always_raising_call_exhausts_retries() {
        let h = Harness::new();
        h.client.script([Script::Raise, Script::Raise]);
        let task = h
            .task(TimeDelta::seconds(1), |t| t.with_max_retries(2))
            .await;
        let mut sub = h.hub.attach(task.id);

        h.executor.start_task(task.id).await.unwrap();
        let messages = h.drain_messages(&mut sub).await;

        let retries: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                LiveUpdate::Retry { error, .. } => Some(error.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(retries.len(), 2);
        assert!(retries.iter().all(|e| e.as_deref().is_some_and(|e| e.contains("scripted"))));

        let Some(LiveUpdate::Failed { result, .. }) = messages.last() else {
            panic!("expected failed, got {:?}", messages.last());
        };
        assert!(result["error"].as_str().unwrap().contains("scripted"));

        let stored = h.load(task.id).await;
        assert_eq!(stored.status, TaskStatus::Failed);
        let result = stored.result.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["retries"], 2);
        assert!(result["last_result"]["error"].is_string());
        assert_eq!(h.client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn last_result_reflects_final_attempt() {
        let h = Harness::new();
        h.client.script([Script::Raise, Script::FailWith(json!({ "code": "SOLD_OUT" }))]);
        let task = h
            .task(TimeDelta::seconds(1), |t| t.with_max_retries(2).with_retry_interval_ms(0))
            .await;

        h.executor.start_task(task.id).await.unwrap();
        h.settle().await;

        let stored = h.load(task.id).await;
        assert_eq!(stored.result.unwrap()["last_result"], json!({ "code": "SOLD_OUT" }));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success() {
        let h = Harness::new();
        h.client.script([Script::Succeed]);
        let task = h
            .task(TimeDelta::seconds(2), |t| t.with_max_retries(5))
            .await;

        h.executor.start_task(task.id).await.unwrap();
        h.settle().await;

        assert_eq!(h.client.calls(), 1);
        assert_eq!(h.load(task.id).await.status, TaskStatus::Completed);
        let levels: Vec<_> = h.logs(task.id).await.into_iter().map(|e| e.level).collect();
        assert!(levels.iter().all(|l| *l == LogLevel::Info));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_countdown_never_calls() {
        let h = Harness::new();
        let task = h.task(TimeDelta::seconds(10), |t| t).await;
        let mut sub = h.hub.attach(task.id);

        h.executor.start_task(task.id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.executor.remaining(task.id).is_some());

        assert!(h.executor.cancel_task(task.id).await);
        assert!(!h.executor.is_running(task.id));

        let kinds = h.drain(&mut sub).await;
        assert_eq!(kinds.last().map(String::as_str), Some("cancelled"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.client.calls(), 0);
        // status is left for the cancelling caller
        assert_eq!(h.load(task.id).await.status, TaskStatus::Countdown);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_retry_stops_further_attempts() {
        let h = Harness::new();
        h.client.script(vec![Script::Fail; 5]);
        let task = h
            .task(TimeDelta::seconds(1), |t| {
                t.with_max_retries(5).with_retry_interval_ms(5_000)
            })
            .await;
        let mut sub = h.hub.attach(task.id);

        h.executor.start_task(task.id).await.unwrap();
        loop {
            match sub.recv().await {
                Some(SubscriptionEvent::Message(LiveUpdate::Retry { .. })) => break,
                Some(_) => continue,
                None => panic!("stream ended before first retry"),
            }
        }
        h.executor.cancel_task(task.id).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.client.calls(), 1);
        assert_eq!(h.load(task.id).await.status, TaskStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_noop() {
        let h = Harness::new();
        let task = h.task(TimeDelta::seconds(5), |t| t).await;

        let (first, second) = tokio::join!(
            h.executor.start_task(task.id),
            h.executor.start_task(task.id)
        );
        let outcomes = [first.unwrap(), second.unwrap()];
        assert!(outcomes.contains(&StartOutcome::Started));
        assert!(outcomes.contains(&StartOutcome::AlreadyRunning));
        assert_eq!(h.executor.running_count(), 1);

        h.settle().await;
        assert_eq!(h.client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_records_reject_start() {
        let h = Harness::new();
        let unknown = TaskId::from_ulid(ulid::Ulid::new());
        assert!(matches!(
            h.executor.start_task(unknown).await,
            Err(StartError::TaskNotFound(id)) if id == unknown
        ));

        let task = h.task(TimeDelta::seconds(5), |t| t).await;
        h.store.delete_configuration(task.config_id).await.unwrap();
        assert!(matches!(
            h.executor.start_task(task.id).await,
            Err(StartError::ConfigurationNotFound { .. })
        ));
        assert_eq!(h.executor.running_count(), 0);
        assert_eq!(h.load(task.id).await.status, TaskStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn store_fault_marks_failed_and_releases() {
        let h = Harness::new();
        let task = h.task(TimeDelta::seconds(5), |t| t).await;
        // Pending -> Countdown is the unit's first status write; make it invalid.
        h.store
            .update_task_status(task.id, TaskStatus::Countdown, None)
            .await
            .unwrap();
        let mut sub = h.hub.attach(task.id);

        h.executor.start_task(task.id).await.unwrap();
        let kinds = h.drain(&mut sub).await;
        assert_eq!(kinds.last().map(String::as_str), Some("error"));

        h.settle().await;
        assert!(!h.executor.is_running(task.id));
        let stored = h.load(task.id).await;
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.result.unwrap()["error"].as_str().unwrap().contains("invalid status transition"));
        assert!(h.logs(task.id).await.iter().any(|e| e.level == LogLevel::Error));
        assert_eq!(h.client.calls(), 0);
    }

    async fn wait_for_executing(sub: &mut crate::impls::Subscription) {
        loop {
            match sub.recv().await {
                Some(SubscriptionEvent::Message(LiveUpdate::Executing { .. })) => return,
                Some(_) => continue,
                None => panic!("stream ended before executing"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_cancelled_call_in_flight() {
        let h = Harness::new();
        h.client.script([Script::SucceedAfter(Duration::from_secs(5))]);
        let task = h.task(TimeDelta::seconds(1), |t| t).await;
        let mut sub = h.hub.attach(task.id);

        h.executor.start_task(task.id).await.unwrap();
        wait_for_executing(&mut sub).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(h.executor.cancel_task(task.id).await);
        assert!(!h.executor.is_running(task.id));
        assert!(h.executor.is_draining(task.id));
        let before = h.logs(task.id).await.len();

        h.executor.shutdown().await;

        assert_eq!(h.executor.draining_count(), 0);
        let logs = h.logs(task.id).await;
        assert_eq!(logs.len(), before + 1);
        assert!(logs.iter().any(|e| e.level == LogLevel::Warning
            && e.message.contains("finished after cancellation: ok=true")));
        assert_eq!(h.client.calls(), 1);
        assert_eq!(h.load(task.id).await.status, TaskStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_task_closed_is_logged_not_stored() {
        let h = Harness::new();
        h.client.script([Script::SucceedAfter(Duration::from_secs(5))]);
        let task = h.task(TimeDelta::seconds(1), |t| t).await;
        let mut sub = h.hub.attach(task.id);

        h.executor.start_task(task.id).await.unwrap();
        wait_for_executing(&mut sub).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        // Cancelled written before the unit's token is cancelled
        h.store
            .update_task_status(task.id, TaskStatus::Cancelled, None)
            .await
            .unwrap();
        h.settle().await;

        let stored = h.load(task.id).await;
        assert_eq!(stored.status, TaskStatus::Cancelled);
        assert!(stored.result.is_none());
        let logs = h.logs(task.id).await;
        assert!(logs.iter().any(|e| e.level == LogLevel::Warning
            && e.message.contains("attempt 1 finished after cancellation: ok=true")));
        assert!(logs.iter().all(|e| e.level != LogLevel::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything() {
        let h = Harness::new();
        let a = h.task(TimeDelta::minutes(5), |t| t).await;
        let b = h.task(TimeDelta::minutes(7), |t| t).await;
        h.executor.start_task(a.id).await.unwrap();
        h.executor.start_task(b.id).await.unwrap();
        assert_eq!(h.executor.running_count(), 2);

        h.executor.shutdown().await;

        assert_eq!(h.executor.running_count(), 0);
        assert_eq!(h.client.calls(), 0);
    }
}
