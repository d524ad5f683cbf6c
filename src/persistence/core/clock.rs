use chrono::{DateTime, Duration, Utc};

/// Source of the timestamps the repository writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Smallest step used to keep `updatedAt` strictly increasing.
pub fn timestamp_resolution() -> Duration {
    Duration::milliseconds(1)
}

/// Pick the next `updatedAt` given the stored one.
///
/// Stores commonly keep millisecond precision, so when the clock has not
/// moved past `previous` by at least one step the result is
/// `previous` plus one [`timestamp_resolution`] step.
pub fn next_update_timestamp(
    now: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match previous {
        Some(previous) if now < previous + timestamp_resolution() => {
            previous + timestamp_resolution()
        }
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_update_uses_clock_when_it_advanced() {
        let previous = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = previous + Duration::seconds(5);

        assert_eq!(next_update_timestamp(now, Some(previous)), now);
    }

    #[test]
    fn test_next_update_bumps_when_clock_stalled() {
        let previous = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let next = next_update_timestamp(previous, Some(previous));
        assert!(next > previous);
        assert_eq!(next, previous + timestamp_resolution());
    }

    #[test]
    fn test_next_update_bumps_when_clock_went_backwards() {
        let previous = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = previous - Duration::seconds(30);

        assert!(next_update_timestamp(now, Some(previous)) > previous);
    }

    #[test]
    fn test_next_update_without_previous() {
        let now = Utc::now();
        assert_eq!(next_update_timestamp(now, None), now);
    }
}
