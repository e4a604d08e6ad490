//! Wire codec for the four PDU types exchanged by the measurement engine
//! (C3).
//!
//! # Why
//! The control and data channels share one UDP socket pair per connection;
//! every inbound datagram must be classified, validated, and rejected fast
//! without touching the connection's live state when it is malformed. Pulling
//! that into its own crate keeps the byte-layout concerns (network order,
//! checksum, size bounds) entirely separate from what the control/load/
//! receiver state machines in `udpst-core` do with the decoded values.
//!
//! # What
//! One struct per PDU (`SetupPdu`, `ActivationPdu`, `LoadPdu`, `StatusPdu`),
//! each with `encode`/`decode`, a fixed or min/max size bound, and a magic
//! number. [`decode_any`] sniffs the leading magic and dispatches.
//!
//! # How
//! Fields are packed in network byte order with `bytes::{Buf, BufMut}`; no
//! padding beyond the fields the PDU actually declares. [`checksum16`]
//! implements the same 16-bit one's-complement-sum-with-end-around-carry
//! algorithm used by IP/UDP checksums, computed with the checksum field
//! itself zeroed, matching the reference protocol's checksum convention.

mod activation;
mod checksum;
mod load;
mod ratewire;
mod setup;
mod status;

pub use activation::{ActivationCmdRequest, ActivationCmdResponse, ActivationPdu, RateAlgorithm};
pub use checksum::checksum16;
pub use load::{LoadPdu, TestAction};
pub use setup::{AuthMode, SetupCmdRequest, SetupCmdResponse, SetupPdu};
pub use status::{StatusPdu, SubIntervalStats};

use thiserror::Error;

/// Setup Request/Response magic (`CHSR_ID`).
pub const SETUP_MAGIC: u16 = 0xACE1;
/// Test Activation Request/Response magic (`CHTA_ID`).
pub const ACTIVATION_MAGIC: u16 = 0xACE2;
/// Load PDU magic (`LOAD_ID`).
pub const LOAD_MAGIC: u16 = 0xBEEF;
/// Status PDU magic (`STATUS_ID`).
pub const STATUS_MAGIC: u16 = 0xFEED;

/// Length of the authentication digest tail on Setup PDUs.
pub const AUTH_DIGEST_LENGTH: usize = 32;

/// Rejects below which alerts stop being logged for a given connection.
pub const WARNING_MSG_LIMIT: u32 = 50;

/// Errors produced while decoding a PDU.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum WireError {
    #[error("PDU too short: got {got}, need at least {want}")]
    TooShort { got: usize, want: usize },
    #[error("PDU too long: got {got}, max is {max}")]
    TooLong { got: usize, max: usize },
    #[error("magic mismatch: expected {expected:#06x}, got {got:#06x}")]
    BadMagic { expected: u16, got: u16 },
    #[error("unrecognized magic {0:#06x}")]
    UnknownMagic(u16),
    #[error("cmdRequest {0} is outside the allowed set")]
    BadCmdRequest(u8),
    #[error("checksum verification failed")]
    BadChecksum,
}

/// Any one of the four decoded PDU types, tagged by which it is.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyPdu {
    Setup(SetupPdu),
    Activation(ActivationPdu),
    Load(LoadPdu),
    Status(StatusPdu),
}

/// Sniffs the leading 16-bit magic and dispatches to the matching decoder.
///
/// Per the verification contract: a size outside `[min, current-max]`, a
/// magic mismatch, an out-of-range `cmdRequest`, or (when a checksum is
/// present and non-zero) a failed checksum all cause the PDU to be dropped
/// rather than partially interpreted.
pub fn decode_any(buf: &[u8]) -> Result<AnyPdu, WireError> {
    if buf.len() < 2 {
        return Err(WireError::TooShort { got: buf.len(), want: 2 });
    }
    let magic = u16::from_be_bytes([buf[0], buf[1]]);
    match magic {
        SETUP_MAGIC => SetupPdu::decode(buf).map(AnyPdu::Setup),
        ACTIVATION_MAGIC => ActivationPdu::decode(buf).map(AnyPdu::Activation),
        LOAD_MAGIC => LoadPdu::decode(buf).map(AnyPdu::Load),
        STATUS_MAGIC => StatusPdu::decode(buf).map(AnyPdu::Status),
        other => Err(WireError::UnknownMagic(other)),
    }
}

/// Rate-limits warning emission to [`WARNING_MSG_LIMIT`] per connection, as
/// required of every "drop and alert" path in §4.3 and §4.7.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlertLimiter {
    emitted: u32,
}

impl AlertLimiter {
    pub fn new() -> Self {
        Self { emitted: 0 }
    }

    /// Returns `true` the first [`WARNING_MSG_LIMIT`] times it is called;
    /// `false` afterward, without resetting (callers reset per-connection at
    /// reconnect, not per-trial).
    pub fn should_emit(&mut self) -> bool {
        if self.emitted >= WARNING_MSG_LIMIT {
            return false;
        }
        self.emitted += 1;
        true
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_limiter_caps_at_warning_msg_limit() {
        let mut limiter = AlertLimiter::new();
        let mut allowed = 0;
        for _ in 0..200 {
            if limiter.should_emit() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, WARNING_MSG_LIMIT);
    }

    #[test]
    fn decode_any_rejects_unknown_magic() {
        let buf = [0x12, 0x34, 0, 0];
        assert_eq!(decode_any(&buf), Err(WireError::UnknownMagic(0x1234)));
    }

    #[test]
    fn decode_any_rejects_short_buffer() {
        assert_eq!(decode_any(&[0xAC]), Err(WireError::TooShort { got: 1, want: 2 }));
    }
}
