//! Small time helpers shared by the controller and ingestor.

use std::time::{Duration, Instant};

/// Step used while waiting for a lid acknowledgement.
pub const LID_WAIT_STEP: Duration = Duration::from_millis(50);

/// Duration in whole milliseconds, saturating at `u64::MAX`.
#[inline]
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Milliseconds from `since` to `now`; zero if `since` is in the future.
#[inline]
pub fn elapsed_ms(now: Instant, since: Instant) -> u64 {
    duration_ms(now.saturating_duration_since(since))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_saturates_backwards() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(1500);
        assert_eq!(elapsed_ms(t1, t0), 1500);
        assert_eq!(elapsed_ms(t0, t1), 0);
    }

    #[test]
    fn duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
        assert_eq!(duration_ms(Duration::from_secs(2)), 2000);
    }
}
