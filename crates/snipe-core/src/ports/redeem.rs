//! RedeemClient port - the single outbound call the executor makes.
//!
//! The executor never inspects the request shape; it hands over the task's
//! redeem target and the configuration headers and gets back either a
//! structured [`CallOutcome`] or an error.

use async_trait::async_trait;

use crate::domain::{CallOutcome, Headers};

/// A call that did not produce a structured outcome.
///
/// The retry loop absorbs these per attempt, exactly like `ok = false`, but
/// logs them at Error level and reports them as `error` text.
#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait RedeemClient: Send + Sync {
    async fn call(&self, redeem_target: &str, headers: &Headers)
    -> Result<CallOutcome, RedeemError>;
}
