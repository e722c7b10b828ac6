//! AppBuilder - wiring of stores, the outbound client and the live-update sink
//!
//! # Design
//! - Builder pattern over trait objects
//! - Fail-fast: `build()` reports every missing collaborator at once
//! - Settings are validated before anything is constructed

use std::sync::Arc;

use super::executor::TaskExecutor;
use super::service::TaskService;
use super::settings::{Settings, SettingsError};
use crate::ports::{
    Clock, ConfigStore, LiveUpdateSink, LogStore, Ports, RedeemClient, SystemClock, TaskStore,
};

/// AppBuilder assembles an [`App`].
///
/// # Example
/// ```ignore
/// let store = Arc::new(InMemoryStore::new());
/// let app = AppBuilder::new()
///     .store(store)
///     .redeem_client(Arc::new(HttpRedeemClient::new(&settings.http)?))
///     .live_updates(Arc::new(LiveUpdateHub::default()))
///     .settings(settings)
///     .build()?;
/// ```
#[derive(Default)]
pub struct AppBuilder {
    tasks: Option<Arc<dyn TaskStore>>,
    configs: Option<Arc<dyn ConfigStore>>,
    logs: Option<Arc<dyn LogStore>>,
    client: Option<Arc<dyn RedeemClient>>,
    updates: Option<Arc<dyn LiveUpdateSink>>,
    clock: Option<Arc<dyn Clock>>,
    settings: Settings,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be supplied before build().")]
    MissingComponents(Vec<&'static str>),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One backend for tasks, configurations and logs.
    pub fn store<S>(self, store: Arc<S>) -> Self
    where
        S: TaskStore + ConfigStore + LogStore + 'static,
    {
        self.task_store(store.clone())
            .config_store(store.clone())
            .log_store(store)
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(store);
        self
    }

    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.configs = Some(store);
        self
    }

    pub fn log_store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.logs = Some(store);
        self
    }

    pub fn redeem_client(mut self, client: Arc<dyn RedeemClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn live_updates(mut self, sink: Arc<dyn LiveUpdateSink>) -> Self {
        self.updates = Some(sink);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// # Validation
    /// - settings pass [`Settings::validate`]
    /// - every store, the client and the live-update sink are present
    pub fn build(self) -> Result<App, BuildError> {
        self.settings.validate()?;

        let mut missing = Vec::new();
        if self.tasks.is_none() {
            missing.push("task_store");
        }
        if self.configs.is_none() {
            missing.push("config_store");
        }
        if self.logs.is_none() {
            missing.push("log_store");
        }
        if self.client.is_none() {
            missing.push("redeem_client");
        }
        if self.updates.is_none() {
            missing.push("live_updates");
        }

        let (Some(tasks), Some(configs), Some(logs), Some(client), Some(updates)) = (
            self.tasks,
            self.configs,
            self.logs,
            self.client,
            self.updates,
        ) else {
            return Err(BuildError::MissingComponents(missing));
        };

        let ports = Ports {
            tasks,
            configs,
            logs,
            client,
            updates,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };
        let executor = TaskExecutor::new(ports.clone());
        let service = TaskService::new(
            ports,
            executor.clone(),
            self.settings.task_defaults.clone(),
            self.settings.bounds.clone(),
        );

        Ok(App {
            settings: self.settings,
            executor,
            service,
        })
    }
}

/// A wired application: the request path plus the executor behind it.
pub struct App {
    pub settings: Settings,
    pub executor: TaskExecutor,
    pub service: TaskService,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryStore, LiveUpdateHub};
    use crate::test_support::ScriptedClient;

    #[test]
    fn test_build_success() {
        let app = AppBuilder::new()
            .store(Arc::new(InMemoryStore::new()))
            .redeem_client(Arc::new(ScriptedClient::default()))
            .live_updates(Arc::new(LiveUpdateHub::default()))
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn test_build_missing_components() {
        let app = AppBuilder::new()
            .log_store(Arc::new(InMemoryStore::new()))
            .live_updates(Arc::new(LiveUpdateHub::default()))
            .build();
        assert!(matches!(
            app,
            Err(BuildError::MissingComponents(missing))
                if missing == vec!["task_store", "config_store", "redeem_client"]
        ));
    }

    #[test]
    fn test_build_rejects_invalid_settings() {
        let mut settings = Settings::default();
        settings.live_update.channel_capacity = 0;

        let app = AppBuilder::new()
            .store(Arc::new(InMemoryStore::new()))
            .redeem_client(Arc::new(ScriptedClient::default()))
            .live_updates(Arc::new(LiveUpdateHub::default()))
            .settings(settings)
            .build();
        assert!(matches!(app, Err(BuildError::Settings(_))));
    }
}
