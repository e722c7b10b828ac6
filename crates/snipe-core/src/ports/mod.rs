//! Ports - collaborator contracts.
//!
//! The executor and the request path only talk to the outside world through
//! these traits: storage, the outbound call, live-update delivery, time and
//! id allocation. `impls` carries in-process implementations.

pub mod clock;
pub mod config_store;
pub mod id_generator;
pub mod live_update;
pub mod log_store;
pub mod redeem;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, MonotonicClock, SystemClock};
pub use self::config_store::ConfigStore;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::live_update::LiveUpdateSink;
pub use self::log_store::LogStore;
pub use self::redeem::{RedeemClient, RedeemError};
pub use self::task_store::{StoreError, TaskStore};

use std::sync::Arc;

/// Bundle of collaborators shared by `TaskExecutor` and `TaskService`.
#[derive(Clone)]
pub struct Ports {
    pub tasks: Arc<dyn TaskStore>,
    pub configs: Arc<dyn ConfigStore>,
    pub logs: Arc<dyn LogStore>,
    pub client: Arc<dyn RedeemClient>,
    pub updates: Arc<dyn LiveUpdateSink>,
    pub clock: Arc<dyn Clock>,
}
