//! IdGenerator port - id allocation for stored records.
//!
//! # Implementations
//! - **UlidGenerator**: ULID whose timestamp part comes from a [`Clock`].

use crate::domain::ids::{ConfigId, LogId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator hands out ids for new records.
///
/// # Thread Safety
/// - `Send + Sync`: shared by every store operation.
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_config_id(&self) -> ConfigId;

    fn generate_log_id(&self) -> LogId;
}

/// ULID generator; the timestamp half follows the supplied clock so ids sort
/// by creation time even under a test clock.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next())
    }

    fn generate_config_id(&self) -> ConfigId {
        ConfigId::from(self.next())
    }

    fn generate_log_id(&self) -> LogId {
        LogId::from(self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();
        let id3 = id_gen.generate_task_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn timestamp_part_comes_from_clock() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_log_id();
        let id2 = id_gen.generate_log_id();

        // random half differs, timestamp half does not
        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
