//! Outcome of one call against the external redeem endpoint.

use serde::{Deserialize, Serialize};

/// Structured result of a call that reached the endpoint.
///
/// `ok = false` is a normal, retryable outcome; transport-level failures are
/// reported as `Err(RedeemError)` by the client instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub ok: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CallOutcome {
    pub fn success(payload: serde_json::Value) -> Self {
        Self { ok: true, payload }
    }

    pub fn failure(payload: serde_json::Value) -> Self {
        Self {
            ok: false,
            payload,
        }
    }
}
