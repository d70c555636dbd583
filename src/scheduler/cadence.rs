use std::time::Duration;

use chrono::{DateTime, Utc};

const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Polling cadence aligned to wall-clock multiples of an interval.
///
/// With the default one-minute interval, polls land on whole minutes.
/// Intervals are clamped to between one millisecond and one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval: Duration,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time from `now` until the next multiple of the interval since the Unix
    /// epoch. Exactly on a boundary this is a full interval.
    pub fn until_next_boundary(&self, now: DateTime<Utc>) -> Duration {
        let interval = self.interval.as_nanos() as i128;
        let now_nanos = now
            .timestamp_nanos_opt()
            .map(i128::from)
            .unwrap_or_else(|| i128::from(now.timestamp_millis()) * 1_000_000);
        let into_interval = now_nanos.rem_euclid(interval);
        Duration::from_nanos((interval - into_interval) as u64)
    }
}
