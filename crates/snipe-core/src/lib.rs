//! snipe-core
//!
//! Time-triggered purchase scheduling: wait for a latency-compensated
//! instant, fire a bounded sequence of outbound attempts, and stream
//! progress to per-task subscribers.
//!
//! # Modules
//! - **domain**: ids, task status machine, records, live-update messages
//! - **ports**: collaborator contracts (stores, RedeemClient, LiveUpdateSink, Clock)
//! - **app**: countdown, retry policy, executor, service, builder, settings
//! - **impls**: in-memory store, broadcast hub, HTTP client
//! - **logging**: tracing subscriber setup

pub mod app;
pub mod domain;
pub mod impls;
pub mod logging;
pub mod ports;

#[cfg(test)]
pub(crate) mod test_support;
