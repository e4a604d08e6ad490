use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{Clock, Sleep, Timestamp};

/// The real, monotonic-for-deltas production clock. `now()` reads wall-clock
/// time (the wire PDUs carry absolute send timestamps, not monotonic ticks,
/// so the two peers' clock-delta-minimum tracking in C7 can work at all);
/// `sleep` defers to `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Timestamp::new(now.as_secs(), now.subsec_nanos())
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_a_plausible_unix_time() {
        let t = SystemClock::new().now();
        assert!(t.secs > 1_700_000_000);
    }
}
