//! App - application layer
//!
//! Combines the ports into the scheduling logic.
//!
//! # Components
//! - **PrecisionCountdown**: latency-compensated countdown with adaptive polling
//! - **RetryPolicy**: bounded, fixed-interval attempt budget
//! - **TaskExecutor**: one supervised unit of work per started task
//! - **TaskService**: validated request path (configurations, tasks, logs, stats)
//! - **AppBuilder**: wiring and fail-fast validation
//! - **Settings**: TOML configuration with environment overrides

pub mod builder;
pub mod countdown;
pub mod executor;
pub mod retry;
pub mod service;
pub mod settings;
pub mod stats;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::countdown::{CountdownHandle, CountdownOutcome, PrecisionCountdown, poll_interval};
pub use self::executor::{StartError, StartOutcome, TaskExecutor};
pub use self::retry::RetryPolicy;
pub use self::service::{ServiceError, StartReceipt, TaskService};
pub use self::settings::{HttpSettings, Settings, SettingsError};
pub use self::stats::TaskStats;
