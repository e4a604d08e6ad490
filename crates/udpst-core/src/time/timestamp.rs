use std::time::Duration;

/// A monotonic or wall-clock timestamp, seconds plus nanosecond remainder,
/// matching the `timespec` layout the wire PDUs carry (`spduTime_sec`/
/// `_nsec`, `lpduTime_sec`/`_nsec`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

const NANOS_PER_SEC: u32 = 1_000_000_000;

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { secs: 0, nanos: 0 };

    pub fn new(secs: u64, nanos: u32) -> Self {
        let mut t = Self { secs, nanos: 0 };
        t.add_nanos(nanos as u64);
        t
    }

    fn add_nanos(&mut self, nanos: u64) {
        let total = self.nanos as u64 + nanos;
        self.secs += total / NANOS_PER_SEC as u64;
        self.nanos = (total % NANOS_PER_SEC as u64) as u32;
    }

    /// `self + delta`, normalizing the nanosecond remainder.
    pub fn plus(&self, delta: Duration64) -> Timestamp {
        let mut out = *self;
        out.add_nanos(delta.as_nanos());
        out
    }

    /// `self - earlier`, saturating at zero if `earlier > self`.
    pub fn minus(&self, earlier: Timestamp) -> Duration64 {
        if *self < earlier {
            return Duration64::ZERO;
        }
        let self_total = self.secs * NANOS_PER_SEC as u64 + self.nanos as u64;
        let other_total = earlier.secs * NANOS_PER_SEC as u64 + earlier.nanos as u64;
        Duration64::from_nanos(self_total - other_total)
    }

    pub fn is_set(&self) -> bool {
        *self != Timestamp::ZERO
    }
}

/// An elapsed-time delta, stored as whole nanoseconds, wide enough to hold a
/// multi-year span without overflow concerns in sums over a test run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Duration64(u64);

impl Duration64 {
    pub const ZERO: Duration64 = Duration64(0);

    pub fn from_nanos(n: u64) -> Self {
        Self(n)
    }

    pub fn from_micros(u: u64) -> Self {
        Self(u * 1_000)
    }

    pub fn from_millis(m: u64) -> Self {
        Self(m * 1_000_000)
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Round-to-nearest conversion to whole microseconds.
    pub fn as_micros_rounded(&self) -> u64 {
        (self.0 + 500) / 1_000
    }

    /// Round-to-nearest conversion to whole milliseconds.
    pub fn as_millis_rounded(&self) -> u64 {
        (self.0 + 500_000) / 1_000_000
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.0)
    }
}

impl From<Duration> for Duration64 {
    fn from(d: Duration) -> Self {
        Self(d.as_nanos() as u64)
    }
}

impl std::ops::Add for Duration64 {
    type Output = Duration64;
    fn add(self, rhs: Duration64) -> Duration64 {
        Duration64(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Duration64 {
    type Output = Duration64;
    fn sub(self, rhs: Duration64) -> Duration64 {
        Duration64(self.0.saturating_sub(rhs.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_normalizes_nanosecond_overflow() {
        let t = Timestamp::new(10, 900_000_000);
        let out = t.plus(Duration64::from_nanos(200_000_000));
        assert_eq!(out, Timestamp::new(11, 100_000_000));
    }

    #[test]
    fn minus_saturates_at_zero_for_future_earlier() {
        let earlier = Timestamp::new(10, 0);
        let later = Timestamp::new(5, 0);
        assert_eq!(later.minus(earlier), Duration64::ZERO);
    }

    #[test]
    fn rounding_rounds_half_up() {
        assert_eq!(Duration64::from_nanos(1_500_499).as_micros_rounded(), 1500);
        assert_eq!(Duration64::from_nanos(1_500_500).as_micros_rounded(), 1501);
    }
}
