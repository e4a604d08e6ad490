//! Connection Table & Event Loop (C4).
//!
//! # Why
//! Everything in this engine is single-threaded and cooperative: one pass
//! drains whatever slots currently have data, bounded so no single noisy
//! connection starves the rest, then a tick fires timer and watchdog work
//! across every slot. Modeling that as an explicit scheduler — rather than
//! one tokio task per connection — keeps the "no locks needed" property the
//! design calls for and matches the reference implementation's single
//! dispatch loop.
//!
//! # What
//! [`ConnectionTable`] is the bounded slot array (server cap
//! [`crate::config::MAX_CONNECTIONS`], client cap the caller's requested
//! connection count). [`EventLoop::drain_pass`] is the load-balanced drain:
//! it calls back into caller-supplied per-slot I/O for every slot that might
//! have data, repeating while at least one slot reported more and the tick
//! budget hasn't elapsed. [`EventLoop::tick`] advances watchdog and timer
//! state once per call.
//!
//! # How
//! The loop itself holds no socket or PDU knowledge — that lives in
//! `control`/`loadgen`/`receiver`, reached through the callback each method
//! takes. This keeps the scheduler deterministically testable without a
//! live socket.

use crate::connection::Connection;
use crate::time::{Duration64, Timestamp};

/// Outcome of attempting to drain one slot during a drain pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrainResult {
    /// Nothing was available; move on.
    Idle,
    /// Data was consumed and the secondary action should run.
    Consumed,
    /// Data was consumed and more is likely still pending (keep this slot
    /// hot for another pass before falling back to idle ones).
    ConsumedMore,
}

pub struct ConnectionTable {
    slots: Vec<Connection>,
}

impl ConnectionTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Connection::free);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Finds the first free slot and returns its index without allocating
    /// into it; callers install the new connection's role/state themselves,
    /// mirroring the reference implementation's accept-then-initialize
    /// split.
    pub fn find_free(&self) -> Option<usize> {
        self.slots.iter().position(Connection::is_free)
    }

    pub fn get(&self, index: usize) -> Option<&Connection> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Connection> {
        self.slots.get_mut(index)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Connection)> {
        self.slots.iter_mut().enumerate()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Connection)> {
        self.slots.iter().enumerate()
    }

    pub fn len_active(&self) -> usize {
        self.slots.iter().filter(|c| !c.is_free()).count()
    }
}

/// Report produced by one [`EventLoop::tick`] call: slots whose end-time
/// watchdog just expired (these must be torn down by the caller) and slots
/// whose timers 1/2/3 just reached their deadline (these must re-arm and
/// fire their associated send/status/stop action).
#[derive(Debug, Default)]
pub struct TickReport {
    pub expired: Vec<usize>,
    pub timer1_due: Vec<usize>,
    pub timer2_due: Vec<usize>,
    pub timer3_due: Vec<usize>,
}

pub struct EventLoop {
    pub table: ConnectionTable,
}

impl EventLoop {
    pub fn new(capacity: usize) -> Self {
        Self { table: ConnectionTable::new(capacity) }
    }

    /// The load-balanced drain: calls `handle` once per non-free slot per
    /// pass, and repeats passes while any slot reported `ConsumedMore` and
    /// the pass budget remains, so one saturated connection cannot starve
    /// the others indefinitely within a single tick window.
    pub fn drain_pass<F>(&mut self, max_passes: usize, mut handle: F)
    where
        F: FnMut(usize, &mut Connection) -> DrainResult,
    {
        for _ in 0..max_passes {
            let mut any_more = false;
            for (index, conn) in self.table.iter_mut() {
                if conn.is_free() {
                    continue;
                }
                match handle(index, conn) {
                    DrainResult::Idle | DrainResult::Consumed => {}
                    DrainResult::ConsumedMore => any_more = true,
                }
            }
            if !any_more {
                break;
            }
        }
    }

    /// Scans every slot once: watchdog expiry first (an expired slot is
    /// reported but not removed here — teardown is the caller's job, since
    /// it differs between server admission-control release and client
    /// aggregate finalization), then each of the three per-slot timers.
    pub fn tick(&mut self, now: Timestamp) -> TickReport {
        let mut report = TickReport::default();
        for (index, conn) in self.table.iter_mut() {
            if conn.is_free() {
                continue;
            }
            if conn.end_time_expired(now) {
                report.expired.push(index);
                continue;
            }
            if due(conn.timers.send_timer1, now) {
                report.timer1_due.push(index);
            }
            if due(conn.timers.send_timer2, now) {
                report.timer2_due.push(index);
            }
            if due(conn.timers.test_timer3, now) {
                report.timer3_due.push(index);
            }
        }
        report
    }

    /// Frees a slot, e.g. after end-time teardown.
    pub fn release(&mut self, index: usize) {
        if let Some(slot) = self.table.get_mut(index) {
            *slot = Connection::free();
        }
    }
}

fn due(deadline: Option<Timestamp>, now: Timestamp) -> bool {
    matches!(deadline, Some(d) if now >= d)
}

/// `test-interval + half a second`, the server's stop-test timer per §4.5.
pub fn stop_test_deadline(now: Timestamp, test_interval: Duration64) -> Timestamp {
    now.plus(test_interval + Duration64::from_millis(500))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;

    #[test]
    fn table_starts_with_every_slot_free() {
        let table = ConnectionTable::new(8);
        assert_eq!(table.len_active(), 0);
        assert_eq!(table.find_free(), Some(0));
    }

    #[test]
    fn allocating_a_slot_removes_it_from_free_search() {
        let mut table = ConnectionTable::new(2);
        let idx = table.find_free().unwrap();
        table.get_mut(idx).unwrap().state = ConnectionState::Created;
        assert_eq!(table.find_free(), Some(1));
    }

    #[test]
    fn drain_pass_repeats_while_any_slot_reports_more() {
        let mut event_loop = EventLoop::new(2);
        let idx = event_loop.table.find_free().unwrap();
        event_loop.table.get_mut(idx).unwrap().state = ConnectionState::Data;

        let mut calls = 0;
        event_loop.drain_pass(5, |_index, _conn| {
            calls += 1;
            if calls < 3 {
                DrainResult::ConsumedMore
            } else {
                DrainResult::Idle
            }
        });
        assert_eq!(calls, 3);
    }

    #[test]
    fn drain_pass_respects_the_max_passes_budget() {
        let mut event_loop = EventLoop::new(1);
        let idx = event_loop.table.find_free().unwrap();
        event_loop.table.get_mut(idx).unwrap().state = ConnectionState::Data;

        let mut calls = 0;
        event_loop.drain_pass(2, |_index, _conn| {
            calls += 1;
            DrainResult::ConsumedMore
        });
        assert_eq!(calls, 2);
    }

    #[test]
    fn tick_reports_expired_end_time() {
        let mut event_loop = EventLoop::new(1);
        let idx = event_loop.table.find_free().unwrap();
        let conn = event_loop.table.get_mut(idx).unwrap();
        conn.state = ConnectionState::Data;
        conn.timers.end_time = Some(Timestamp::new(100, 0));

        let report = event_loop.tick(Timestamp::new(100, 0));
        assert_eq!(report.expired, vec![idx]);
    }

    #[test]
    fn tick_reports_due_send_timers() {
        let mut event_loop = EventLoop::new(1);
        let idx = event_loop.table.find_free().unwrap();
        let conn = event_loop.table.get_mut(idx).unwrap();
        conn.state = ConnectionState::Data;
        conn.timers.send_timer1 = Some(Timestamp::new(50, 0));
        conn.timers.end_time = Some(Timestamp::new(1000, 0));

        let report = event_loop.tick(Timestamp::new(60, 0));
        assert_eq!(report.timer1_due, vec![idx]);
    }
}
