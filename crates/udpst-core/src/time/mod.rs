//! Time & Timer Service (C1).
//!
//! # Why
//! Every other component reasons about elapsed microseconds against a
//! single, injectable notion of "now": the event loop's tick, the three
//! per-connection timers, the end-time watchdog, and the receiver's
//! delay-variation sampling all need the same clock so that tests can drive
//! time deterministically instead of sleeping in wall-clock real time.
//!
//! # What
//! [`Clock`] is the trait every timing consumer is generic over;
//! [`SystemClock`] is the real, monotonic production implementation;
//! [`MockClock`] is a virtual clock a test advances explicitly.
//! [`Timestamp`]/[`Duration64`] give the nanosecond-normalized add/sub/
//! compare/round-to-millis/round-to-micros primitives the wire codec and
//! statistics pipeline need.
//!
//! # How
//! A `Clock` trait with `now()`/`sleep(duration)`, and a `MockClock` built
//! from a `Mutex`-guarded shared state plus a list of pending sleepers woken
//! on `advance`.

mod mock;
mod system;
mod timestamp;

pub use mock::MockClock;
pub use system::SystemClock;
pub use timestamp::{Duration64, Timestamp};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A boxed, type-erased sleep future.
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Abstracts "what time is it" and "wake me up later" so the event loop,
/// timers, and statistics pipeline never call `std::time`/`tokio::time`
/// directly.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
    fn sleep(&self, duration: Duration) -> Sleep;
}
