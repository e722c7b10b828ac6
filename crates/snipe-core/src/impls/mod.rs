//! Impls - in-process implementations of the ports
//!
//! # Implementations
//! - **InMemoryStore**: TaskStore + ConfigStore + LogStore
//! - **LiveUpdateHub**: per-task broadcast fan-out
//! - **HttpRedeemClient**: JSON POST via reqwest
//!
//! A durable store would live in its own crate behind the same traits.

pub mod http_redeem;
pub mod inmem_store;
pub mod live_hub;

pub use self::http_redeem::HttpRedeemClient;
pub use self::inmem_store::InMemoryStore;
pub use self::live_hub::{LiveUpdateHub, Subscription, SubscriptionEvent};
