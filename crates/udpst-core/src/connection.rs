//! The connection record (C4's per-slot state) and its small supporting
//! enums.
//!
//! # Why
//! The reference implementation dispatches per-slot work through three
//! function-pointer fields (`priAction`/`secAction`/`timerNAction`) and a
//! grab-bag of `*AltUse` fields whose meaning depends on which of those
//! pointers is installed. An explicit role enum plus role-specific state is
//! the idiomatic replacement: the event loop matches on [`ConnectionRole`]
//! to decide what "primary action" and "secondary action" mean for this
//! slot, and the compiler — not a comment — enforces that a
//! `test-downstream` connection never reaches for upstream-only fields.
//!
//! # What
//! [`Connection`] bundles one transport endpoint, lifecycle
//! ([`ConnectionState`]), role ([`ConnectionRole`]), negotiated
//! [`crate::config::TestParameters`], the three named timers plus the
//! end-time watchdog, and role-specific payloads (rate-adjustment state,
//! receiver statistics) behind [`RoleState`].
//!
//! # How
//! Grounded on `udpst.h`'s `struct connection` for the field inventory, with
//! the function-pointer dispatch and `*AltUse` fields replaced per the
//! redesign above.

use udpst_transport_udp::UdpEndpoint;
pub use udpst_wire::TestAction;

use crate::config::TestParameters;
use crate::ratecontrol::RateAdjuster;
use crate::receiver::ReceiverStats;
use crate::time::Timestamp;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Free,
    Created,
    Bound,
    Data,
}

/// Which job this slot is doing; selects what the event loop's primary and
/// secondary actions mean for it.
#[derive(Debug)]
pub enum ConnectionRole {
    /// Server-side control-port listener; not itself a test connection.
    SetupListener,
    /// This side transmits load PDUs and receives status PDUs.
    TestUpstream { adjuster: RateAdjuster },
    /// This side receives load PDUs and transmits status PDUs.
    TestDownstream { stats: ReceiverStats },
    /// Client-only virtual connection with no socket; see `aggregate`.
    Aggregate,
}

/// The three named timers plus the end-time watchdog. A `None` deadline
/// means "not armed".
#[derive(Clone, Copy, Debug, Default)]
pub struct Timers {
    pub send_timer1: Option<Timestamp>,
    pub send_timer2: Option<Timestamp>,
    pub test_timer3: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
}

pub struct Connection {
    pub state: ConnectionState,
    pub role: ConnectionRole,
    pub endpoint: Option<UdpEndpoint>,
    pub test_action: TestAction,
    pub params: TestParameters,
    pub timers: Timers,
    /// Index into the global sending-rate table currently in effect for
    /// this connection (meaningful for both upstream and downstream roles:
    /// the downstream side echoes back whatever the upstream sender used).
    pub sr_index: usize,
}

impl Connection {
    pub fn free() -> Self {
        Self {
            state: ConnectionState::Free,
            role: ConnectionRole::SetupListener,
            endpoint: None,
            test_action: TestAction::Test,
            params: TestParameters::default(),
            timers: Timers::default(),
            sr_index: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == ConnectionState::Free
    }

    /// During a stop phase, the load generator clamps burst size to 1 and
    /// either side advances its local stop bookkeeping; this reports
    /// whether that phase is active.
    pub fn is_stopping(&self) -> bool {
        self.test_action != TestAction::Test
    }

    pub fn refresh_end_time(&mut self, now: Timestamp, timeout: crate::time::Duration64) {
        self.timers.end_time = Some(now.plus(timeout));
    }

    pub fn end_time_expired(&self, now: Timestamp) -> bool {
        matches!(self.timers.end_time, Some(deadline) if now >= deadline)
    }
}
