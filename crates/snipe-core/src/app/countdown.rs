//! PrecisionCountdown - wait for a latency-compensated instant.
//!
//! The fire instant is `target - compensation`, computed once at construction.
//! While waiting, the countdown reports the remaining time to a progress sink
//! and sleeps for an interval that shrinks as the fire instant approaches
//! (see [`poll_interval`]). At zero it runs its terminal action exactly once.
//!
//! # Cancellation
//! Cancellation goes through a [`CancellationToken`]. It is checked at the top
//! of every iteration and also races every sleep, so a cancelled countdown
//! returns promptly and never runs the terminal action afterwards.

use chrono::{DateTime, TimeDelta, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::ports::{Clock, SystemClock};

/// Sleep interval for a given remaining time.
///
/// | remaining    | interval |
/// |--------------|----------|
/// | >= 60s       | 10s      |
/// | [2s, 60s)    | 1s       |
/// | [0.5s, 2s)   | 100ms    |
/// | (0, 0.5s)    | 10ms     |
pub fn poll_interval(remaining: Duration) -> Duration {
    if remaining >= Duration::from_secs(60) {
        Duration::from_secs(10)
    } else if remaining >= Duration::from_secs(2) {
        Duration::from_secs(1)
    } else if remaining >= Duration::from_millis(500) {
        Duration::from_millis(100)
    } else {
        Duration::from_millis(10)
    }
}

/// How a countdown run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownOutcome<T> {
    /// Reached zero; carries the terminal action's output.
    Fired(T),
    Cancelled,
}

/// Cloneable view of a countdown for other tasks: query remaining time, cancel.
#[derive(Clone)]
pub struct CountdownHandle {
    fire_at: DateTime<Utc>,
    token: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl CountdownHandle {
    pub fn fire_at(&self) -> DateTime<Utc> {
        self.fire_at
    }

    /// `max(0, fire_at - now)`.
    pub fn remaining(&self) -> Duration {
        (self.fire_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn remaining_seconds(&self) -> f64 {
        self.remaining().as_secs_f64()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl std::fmt::Debug for CountdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownHandle")
            .field("fire_at", &self.fire_at)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Countdown bound to a target instant and a one-shot terminal action.
pub struct PrecisionCountdown<A> {
    target: DateTime<Utc>,
    handle: CountdownHandle,
    action: A,
}

impl<A> PrecisionCountdown<A> {
    pub fn new(target: DateTime<Utc>, compensation: Duration, action: A) -> Self {
        Self {
            target,
            handle: CountdownHandle {
                fire_at: fire_instant(target, compensation),
                token: CancellationToken::new(),
                clock: Arc::new(SystemClock),
            },
            action,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.handle.clock = clock;
        self
    }

    /// Use `token` (typically a child of an owner's token) for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.handle.token = token;
        self
    }

    pub fn target(&self) -> DateTime<Utc> {
        self.target
    }

    pub fn fire_at(&self) -> DateTime<Utc> {
        self.handle.fire_at
    }

    pub fn remaining_seconds(&self) -> f64 {
        self.handle.remaining_seconds()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn handle(&self) -> CountdownHandle {
        self.handle.clone()
    }
}

impl<A, F> PrecisionCountdown<A>
where
    A: FnOnce() -> F,
    F: Future,
{
    /// Count down, calling `progress(remaining)` before every sleep.
    ///
    /// Sleeps never overshoot the fire instant: the interval from
    /// [`poll_interval`] is clamped to the remaining time.
    pub async fn run<P, PF>(self, mut progress: P) -> CountdownOutcome<F::Output>
    where
        P: FnMut(Duration) -> PF,
        PF: Future<Output = ()>,
    {
        let Self { handle, action, .. } = self;

        loop {
            if handle.is_cancelled() {
                return CountdownOutcome::Cancelled;
            }

            let remaining = handle.remaining();
            if remaining.is_zero() {
                break;
            }

            progress(remaining).await;

            let interval = poll_interval(remaining).min(remaining);
            tokio::select! {
                biased;
                _ = handle.token.cancelled() => return CountdownOutcome::Cancelled,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        if handle.is_cancelled() {
            return CountdownOutcome::Cancelled;
        }
        CountdownOutcome::Fired(action().await)
    }
}

/// `target - compensation`, saturating at the earliest representable instant.
pub fn fire_instant(target: DateTime<Utc>, compensation: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(compensation)
        .ok()
        .and_then(|delta| target.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
