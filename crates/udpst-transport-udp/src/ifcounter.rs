//! sysfs interface byte-counter sampler.
//!
//! Treated strictly as an external collaborator: the engine only ever calls
//! [`InterfaceByteCounter::sample`] through this trait, never reads
//! `/sys/class/net/*` directly from `udpst-core`.

use std::fmt;

/// A monotonic (until it wraps) counter pair read from a network interface.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InterfaceByteCounts {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

pub trait InterfaceByteCounter: fmt::Debug + Send + Sync {
    /// Raw read of the current counter values.
    fn read(&self) -> std::io::Result<InterfaceByteCounts>;

    /// Samples the counters and returns the delta since `previous`,
    /// transparently handling a single wraparound at 2^32 or 2^64 (the two
    /// widths Linux has used for these sysfs counters over time). A delta
    /// spanning more than one wrap is not distinguishable from a reset and is
    /// reported as the raw (possibly small or zero) wrapped difference.
    fn sample(&self, previous: InterfaceByteCounts) -> std::io::Result<(InterfaceByteCounts, InterfaceByteCounts)> {
        let current = self.read()?;
        let delta = InterfaceByteCounts {
            rx_bytes: wrapping_delta(previous.rx_bytes, current.rx_bytes),
            tx_bytes: wrapping_delta(previous.tx_bytes, current.tx_bytes),
        };
        Ok((current, delta))
    }
}

fn wrapping_delta(previous: u64, current: u64) -> u64 {
    if current >= previous {
        current - previous
    } else if previous <= u32::MAX as u64 {
        (current + (1u64 << 32)) - previous
    } else {
        current.wrapping_sub(previous)
    }
}

/// Reads `/sys/class/net/<interface>/statistics/{rx,tx}_bytes`.
#[derive(Debug, Clone)]
pub struct LinuxSysfsByteCounter {
    interface: String,
}

impl LinuxSysfsByteCounter {
    pub fn new(interface: impl Into<String>) -> Self {
        Self { interface: interface.into() }
    }

    fn path(&self, which: &str) -> std::path::PathBuf {
        std::path::PathBuf::from("/sys/class/net")
            .join(&self.interface)
            .join("statistics")
            .join(which)
    }
}

impl InterfaceByteCounter for LinuxSysfsByteCounter {
    fn read(&self) -> std::io::Result<InterfaceByteCounts> {
        let rx_bytes = std::fs::read_to_string(self.path("rx_bytes"))?.trim().parse().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "rx_bytes was not a valid integer")
        })?;
        let tx_bytes = std::fs::read_to_string(self.path("tx_bytes"))?.trim().parse().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "tx_bytes was not a valid integer")
        })?;
        Ok(InterfaceByteCounts { rx_bytes, tx_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_without_wrap_is_simple_subtraction() {
        assert_eq!(wrapping_delta(100, 150), 50);
    }

    #[test]
    fn delta_across_32_bit_wrap_is_reconstructed() {
        let previous = (u32::MAX - 10) as u64;
        let current = 5u64;
        assert_eq!(wrapping_delta(previous, current), 16);
    }

    #[derive(Debug)]
    struct FakeCounter(std::cell::Cell<InterfaceByteCounts>);

    impl InterfaceByteCounter for FakeCounter {
        fn read(&self) -> std::io::Result<InterfaceByteCounts> {
            Ok(self.0.get())
        }
    }

    // Safety for the test: FakeCounter is only ever used single-threaded.
    unsafe impl Sync for FakeCounter {}

    #[test]
    fn sample_reports_delta_since_previous() {
        let counter = FakeCounter(std::cell::Cell::new(InterfaceByteCounts { rx_bytes: 1000, tx_bytes: 2000 }));
        let previous = InterfaceByteCounts { rx_bytes: 900, tx_bytes: 1800 };
        let (current, delta) = counter.sample(previous).unwrap();
        assert_eq!(current.rx_bytes, 1000);
        assert_eq!(delta.rx_bytes, 100);
        assert_eq!(delta.tx_bytes, 200);
    }
}
