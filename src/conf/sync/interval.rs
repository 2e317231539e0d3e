//! Sync scheduling policy
//!
//! The interval depends on how close the conference is; failed passes back off
//! exponentially from a small base, capped by that interval.

use std::time::Duration;

const HOUR: u64 = 60 * 60;
const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct SyncIntervalPolicy {
    /// Conference start, epoch millis
    pub conference_start_millis: i64,
    /// Conference end, epoch millis
    pub conference_end_millis: i64,
    /// How long before the start the "near" interval kicks in
    pub lead_time_millis: i64,
    pub long_before: Duration,
    pub near_or_during: Duration,
    pub after: Duration,
    pub backoff_base: Duration,
}

impl SyncIntervalPolicy {
    pub fn new(conference_start_millis: i64, conference_end_millis: i64) -> Self {
        Self {
            conference_start_millis,
            conference_end_millis,
            lead_time_millis: 10 * DAY_MILLIS,
            long_before: Duration::from_secs(6 * HOUR),
            near_or_during: Duration::from_secs(2 * HOUR),
            after: Duration::from_secs(12 * HOUR),
            backoff_base: Duration::from_secs(30),
        }
    }

    /// Regular interval at `now_millis`
    pub fn interval_at(&self, now_millis: i64) -> Duration {
        if now_millis < self.conference_start_millis - self.lead_time_millis {
            self.long_before
        } else if now_millis <= self.conference_end_millis {
            self.near_or_during
        } else {
            self.after
        }
    }

    /// Delay before the next pass: the interval, or the backoff after failures
    pub fn next_delay(&self, now_millis: i64, consecutive_failures: u32) -> Duration {
        let interval = self.interval_at(now_millis);
        if consecutive_failures == 0 {
            return interval;
        }
        let factor = 1u32
            .checked_shl(consecutive_failures - 1)
            .unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map_or(interval, |backoff| backoff.min(interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SyncIntervalPolicy {
        // conference from day 100 to day 102
        SyncIntervalPolicy::new(100 * DAY_MILLIS, 102 * DAY_MILLIS)
    }

    #[test]
    fn interval_tightens_near_the_conference() {
        let p = policy();
        assert_eq!(p.interval_at(0), Duration::from_secs(6 * HOUR));
        assert_eq!(p.interval_at(90 * DAY_MILLIS - 1), Duration::from_secs(6 * HOUR));
        assert_eq!(p.interval_at(90 * DAY_MILLIS), Duration::from_secs(2 * HOUR));
        assert_eq!(p.interval_at(101 * DAY_MILLIS), Duration::from_secs(2 * HOUR));
        assert_eq!(p.interval_at(102 * DAY_MILLIS), Duration::from_secs(2 * HOUR));
        assert_eq!(p.interval_at(102 * DAY_MILLIS + 1), Duration::from_secs(12 * HOUR));
    }

    #[test]
    fn backoff_doubles_up_to_the_interval() {
        let p = policy();
        let now = 101 * DAY_MILLIS;
        assert_eq!(p.next_delay(now, 0), Duration::from_secs(2 * HOUR));
        assert_eq!(p.next_delay(now, 1), Duration::from_secs(30));
        assert_eq!(p.next_delay(now, 2), Duration::from_secs(60));
        assert_eq!(p.next_delay(now, 5), Duration::from_secs(480));
        assert_eq!(p.next_delay(now, 10), Duration::from_secs(2 * HOUR));
        assert_eq!(p.next_delay(now, 200), Duration::from_secs(2 * HOUR));
    }
}
