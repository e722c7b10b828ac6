//! Domain model (ids, status machine, records, live-update messages).

pub mod config;
pub mod errors;
pub mod events;
pub mod ids;
pub mod log;
pub mod outcome;
pub mod state;
pub mod task;

pub use config::{ConfigPatch, Configuration, Headers, NewConfiguration};
pub use errors::ValidationError;
pub use events::LiveUpdate;
pub use ids::{ConfigId, LogId, ParseIdError, TaskId};
pub use log::{LogEntry, LogFilter, LogLevel};
pub use outcome::CallOutcome;
pub use state::{TaskStatus, UnknownStatus};
pub use task::{NewTask, Task, TaskBounds, TaskDefaults, TaskDraft, TaskFilter, TaskPatch};
