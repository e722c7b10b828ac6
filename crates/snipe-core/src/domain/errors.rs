//! Errors - input validation failures.
//!
//! Store, call and executor errors live next to the port or component that
//! raises them; this module only holds the errors produced by checking user
//! input against the domain rules.

use chrono::{DateTime, Utc};

/// ValidationError is surfaced synchronously to the request that supplied the
/// bad input. Nothing is spawned or mutated when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("target time {target} is not in the future (now: {now})")]
    TargetNotInFuture {
        target: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("{field}={value} is outside the allowed range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("configuration name must not be empty")]
    EmptyName,

    #[error("redeem target must not be empty")]
    EmptyTarget,
}
