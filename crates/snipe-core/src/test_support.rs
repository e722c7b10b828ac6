//! Shared fixtures for unit tests: a scripted RedeemClient and a fully wired
//! in-memory harness running on tokio's (paused) clock.

use async_trait::async_trait;
use chrono::TimeDelta;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::app::{TaskExecutor, TaskService};
use crate::domain::{
    CallOutcome, Headers, LiveUpdate, LogEntry, LogFilter, NewConfiguration, NewTask, Task,
    TaskBounds, TaskDefaults, TaskId,
};
use crate::impls::{InMemoryStore, LiveUpdateHub, Subscription, SubscriptionEvent};
use crate::ports::{
    Clock, ConfigStore, LogStore, MonotonicClock, Ports, RedeemClient, RedeemError, TaskStore,
};

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Succeed,
    Fail,
    FailWith(Value),
    Raise,
    /// Succeed after the call has been outstanding for the given time.
    SucceedAfter(Duration),
}

/// Plays back a fixed sequence of outcomes; succeeds once the script runs out.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    script: Mutex<VecDeque<Script>>,
    calls: AtomicU32,
}

impl ScriptedClient {
    pub(crate) fn script(&self, steps: impl IntoIterator<Item = Script>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RedeemClient for ScriptedClient {
    async fn call(&self, _target: &str, _headers: &Headers) -> Result<CallOutcome, RedeemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Succeed);
        match step {
            Script::Succeed => Ok(CallOutcome::success(json!({ "success": true, "order": "A1" }))),
            Script::Fail => Ok(CallOutcome::failure(
                json!({ "success": false, "message": "not open yet" }),
            )),
            Script::FailWith(payload) => Ok(CallOutcome::failure(payload)),
            Script::Raise => Err(RedeemError::Transport("scripted connection reset".into())),
            Script::SucceedAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(CallOutcome::success(json!({ "success": true, "order": "A1" })))
            }
        }
    }
}

pub(crate) struct Harness {
    pub clock: Arc<dyn Clock>,
    pub store: Arc<InMemoryStore>,
    pub hub: Arc<LiveUpdateHub>,
    pub client: Arc<ScriptedClient>,
    pub executor: TaskExecutor,
    pub service: TaskService,
}

impl Harness {
    /// Must be called inside a tokio runtime (the clock anchors to it).
    pub(crate) fn new() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let store = Arc::new(InMemoryStore::with_clock(Arc::clone(&clock)));
        let hub = Arc::new(LiveUpdateHub::default());
        let client = Arc::new(ScriptedClient::default());

        let ports = Ports {
            tasks: store.clone(),
            configs: store.clone(),
            logs: store.clone(),
            client: client.clone(),
            updates: hub.clone(),
            clock: Arc::clone(&clock),
        };
        let executor = TaskExecutor::new(ports.clone());
        let service = TaskService::new(
            ports,
            executor.clone(),
            TaskDefaults::default(),
            TaskBounds::default(),
        );

        Self {
            clock,
            store,
            hub,
            client,
            executor,
            service,
        }
    }

    /// Create a fresh configuration and a Pending task targeting `now + offset`.
    pub(crate) async fn task(
        &self,
        offset: TimeDelta,
        customize: impl FnOnce(NewTask) -> NewTask,
    ) -> Task {
        let config = self
            .store
            .create_configuration(NewConfiguration::new(format!("cfg-{}", ulid::Ulid::new())))
            .await
            .unwrap();
        let new = customize(NewTask::new(config.id, "item-1", self.clock.now() + offset));
        let draft = new
            .resolve(
                &TaskDefaults::default(),
                &TaskBounds::default(),
                self.clock.now(),
            )
            .unwrap();
        self.store.create_task(draft).await.unwrap()
    }

    pub(crate) async fn load(&self, id: TaskId) -> Task {
        self.store.load_task(id).await.unwrap().unwrap()
    }

    pub(crate) async fn logs(&self, id: TaskId) -> Vec<LogEntry> {
        self.store.list_logs(LogFilter::for_task(id)).await.unwrap()
    }

    /// Every message until the stream ends.
    pub(crate) async fn drain_messages(&self, sub: &mut Subscription) -> Vec<LiveUpdate> {
        let mut messages = Vec::new();
        while let Some(event) = sub.recv().await {
            match event {
                SubscriptionEvent::Message(message) => messages.push(message),
                SubscriptionEvent::Lagged(n) => panic!("test subscriber lagged by {n}"),
            }
        }
        messages
    }

    /// Message kinds until the stream ends.
    pub(crate) async fn drain(&self, sub: &mut Subscription) -> Vec<String> {
        self.drain_messages(sub)
            .await
            .iter()
            .map(|m| m.kind().to_string())
            .collect()
    }

    /// Wait (in paused time) until no unit is tracked or draining.
    pub(crate) async fn settle(&self) {
        for _ in 0..100_000 {
            if self.executor.running_count() == 0 && self.executor.draining_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("executor did not settle");
    }
}
