use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use super::{Clock, Duration64, Sleep, Timestamp};

struct SleepShared {
    due: Timestamp,
    woken: Mutex<(bool, Option<Waker>)>,
}

struct ClockState {
    origin: Timestamp,
    elapsed: Duration64,
    sleepers: Vec<Arc<SleepShared>>,
}

/// A deterministic virtual clock for tests: `now()` returns `origin +
/// elapsed`, and nothing advances until a test calls [`MockClock::advance`],
/// which wakes every sleeper whose deadline has passed.
///
/// Shared `Mutex`-guarded state, a `Vec` of pending sleepers, manual
/// `Future` implementation with waker registration instead of relying on a
/// runtime's timer wheel.
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<Mutex<ClockState>>,
}

impl MockClock {
    pub fn new(origin: Timestamp) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockState {
                origin,
                elapsed: Duration64::ZERO,
                sleepers: Vec::new(),
            })),
        }
    }

    /// Advances the clock by `delta` and wakes every sleeper now due.
    pub fn advance(&self, delta: Duration64) {
        let mut state = self.inner.lock().expect("mock clock state lock");
        state.elapsed = state.elapsed + delta;
        let now = state.origin.plus(state.elapsed);
        state.sleepers.retain(|sleeper| {
            if sleeper.due <= now {
                let mut woken = sleeper.woken.lock().expect("sleep shared lock");
                woken.0 = true;
                if let Some(waker) = woken.1.take() {
                    waker.wake();
                }
                false
            } else {
                true
            }
        });
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        let state = self.inner.lock().expect("mock clock state lock");
        state.origin.plus(state.elapsed)
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let now = self.now();
        let due = now.plus(Duration64::from(duration));
        let shared = Arc::new(SleepShared { due, woken: Mutex::new((false, None)) });
        {
            let mut state = self.inner.lock().expect("mock clock state lock");
            if due <= now {
                // Already due: don't register, the future resolves first poll.
            } else {
                state.sleepers.push(shared.clone());
            }
        }
        Box::pin(SleepFuture { shared, due, now })
    }
}

struct SleepFuture {
    shared: Arc<SleepShared>,
    due: Timestamp,
    now: Timestamp,
}

impl Future for SleepFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.due <= self.now {
            return Poll::Ready(());
        }
        let mut woken = self.shared.woken.lock().expect("sleep shared lock");
        if woken.0 {
            Poll::Ready(())
        } else {
            woken.1 = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite_poll::block_on_once;

    #[test]
    fn time_does_not_pass_without_advance() {
        let clock = MockClock::new(Timestamp::ZERO);
        let t0 = clock.now();
        let t1 = clock.now();
        assert_eq!(t0, t1);
    }

    #[test]
    fn advance_moves_now_forward() {
        let clock = MockClock::new(Timestamp::ZERO);
        clock.advance(Duration64::from_millis(250));
        assert_eq!(clock.now(), Timestamp::new(0, 250_000_000));
    }

    #[test]
    fn sleeper_resolves_once_advance_passes_its_deadline() {
        let clock = MockClock::new(Timestamp::ZERO);
        let fut = clock.sleep(Duration::from_millis(100));
        tokio::pin!(fut);
        assert!(block_on_once(fut.as_mut()).is_none());
        clock.advance(Duration64::from_millis(150));
        assert!(block_on_once(fut.as_mut()).is_some());
    }

    /// Minimal single-poll executor for the deterministic-clock unit tests
    /// above; avoids pulling in a full async test harness for a two-line
    /// assertion.
    mod futures_lite_poll {
        use std::future::Future;
        use std::pin::Pin;
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn noop_raw_waker() -> RawWaker {
            fn clone(_: *const ()) -> RawWaker {
                noop_raw_waker()
            }
            fn noop(_: *const ()) {}
            let vtable = &RawWakerVTable::new(clone, noop, noop, noop);
            RawWaker::new(std::ptr::null(), vtable)
        }

        pub fn block_on_once<F: Future>(fut: Pin<&mut F>) -> Option<F::Output> {
            let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
            let mut cx = Context::from_waker(&waker);
            match fut.poll(&mut cx) {
                Poll::Ready(v) => Some(v),
                Poll::Pending => None,
            }
        }
    }
}
