use bytes::{Buf, BufMut, BytesMut};

use crate::{WireError, LOAD_MAGIC};

/// A connection's current test phase, carried on every Load and Status PDU.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestAction {
    Test = 0,
    Stop1 = 1,
    Stop2 = 2,
}

impl TestAction {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Test),
            1 => Some(Self::Stop1),
            2 => Some(Self::Stop2),
            _ => None,
        }
    }
}

/// Test-payload datagram. No checksum: its send rate can reach the hundreds
/// of thousands per second, and loss/corruption of its timing fields is
/// already absorbed by the statistics pipeline it feeds.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadPdu {
    pub test_action: u8,
    pub rx_stopped: bool,
    pub lpdu_seq_no: u32,
    pub udp_payload: u32,
    pub spdu_seq_err: u32,
    pub spdu_time_sec: u32,
    pub spdu_time_nsec: u32,
    pub lpdu_time_sec: u32,
    pub lpdu_time_nsec: u32,
    pub rtt_response_delay_ms: u32,
}

const FIXED_LEN: usize = 2 // magic
    + 1 + 1 // test_action, rx_stopped
    + 4 // lpdu_seq_no
    + 4 // udp_payload
    + 4 // spdu_seq_err
    + 4 + 4 // spdu_time sec+nsec
    + 4 + 4 // lpdu_time sec+nsec
    + 4; // rtt_response_delay_ms

impl LoadPdu {
    pub const WIRE_LEN: usize = FIXED_LEN;

    pub fn test_action(&self) -> Option<TestAction> {
        TestAction::from_u8(self.test_action)
    }

    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(Self::WIRE_LEN);
        out.put_u16(LOAD_MAGIC);
        out.put_u8(self.test_action);
        out.put_u8(self.rx_stopped as u8);
        out.put_u32(self.lpdu_seq_no);
        out.put_u32(self.udp_payload);
        out.put_u32(self.spdu_seq_err);
        out.put_u32(self.spdu_time_sec);
        out.put_u32(self.spdu_time_nsec);
        out.put_u32(self.lpdu_time_sec);
        out.put_u32(self.lpdu_time_nsec);
        out.put_u32(self.rtt_response_delay_ms);
        out
    }

    /// Decodes a Load PDU. Unlike the control PDUs its declared `udp_payload`
    /// may legitimately differ from `buf.len()` (trailing payload bytes are
    /// not part of this header and are not validated beyond the minimum
    /// header size).
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(WireError::TooShort { got: buf.len(), want: Self::WIRE_LEN });
        }
        let mut cur = &buf[..Self::WIRE_LEN];
        let magic = cur.get_u16();
        if magic != LOAD_MAGIC {
            return Err(WireError::BadMagic { expected: LOAD_MAGIC, got: magic });
        }
        let test_action = cur.get_u8();
        let rx_stopped = cur.get_u8() != 0;
        let lpdu_seq_no = cur.get_u32();
        let udp_payload = cur.get_u32();
        let spdu_seq_err = cur.get_u32();
        let spdu_time_sec = cur.get_u32();
        let spdu_time_nsec = cur.get_u32();
        let lpdu_time_sec = cur.get_u32();
        let lpdu_time_nsec = cur.get_u32();
        let rtt_response_delay_ms = cur.get_u32();

        Ok(Self {
            test_action,
            rx_stopped,
            lpdu_seq_no,
            udp_payload,
            spdu_seq_err,
            spdu_time_sec,
            spdu_time_nsec,
            lpdu_time_sec,
            lpdu_time_nsec,
            rtt_response_delay_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LoadPdu {
        LoadPdu {
            test_action: TestAction::Test as u8,
            rx_stopped: false,
            lpdu_seq_no: 12345,
            udp_payload: 1222,
            spdu_seq_err: 0,
            spdu_time_sec: 1_700_000_000,
            spdu_time_nsec: 500_000_000,
            lpdu_time_sec: 1_700_000_000,
            lpdu_time_nsec: 600_000_000,
            rtt_response_delay_ms: 2,
        }
    }

    #[test]
    fn round_trips() {
        let pdu = sample();
        let encoded = pdu.encode();
        let decoded = LoadPdu::decode(&encoded).unwrap();
        assert_eq!(pdu, decoded);
    }

    #[test]
    fn trailing_payload_bytes_are_ignored_by_header_decode() {
        let pdu = sample();
        let mut encoded = pdu.encode();
        encoded.extend_from_slice(&[0xAA; 1200]);
        let decoded = LoadPdu::decode(&encoded).unwrap();
        assert_eq!(pdu, decoded);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = sample().encode();
        encoded[0] ^= 0xFF;
        assert!(matches!(LoadPdu::decode(&encoded), Err(WireError::BadMagic { .. })));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn arbitrary_fields_round_trip(
            lpdu_seq_no in any::<u32>(),
            udp_payload in any::<u32>(),
            spdu_seq_err in any::<u32>(),
            lpdu_time_sec in any::<u32>(),
            lpdu_time_nsec in any::<u32>(),
            rtt_response_delay_ms in any::<u32>(),
            rx_stopped in any::<bool>(),
        ) {
            let pdu = LoadPdu {
                test_action: TestAction::Test as u8,
                rx_stopped,
                lpdu_seq_no,
                udp_payload,
                spdu_seq_err,
                spdu_time_sec: 0,
                spdu_time_nsec: 0,
                lpdu_time_sec,
                lpdu_time_nsec,
                rtt_response_delay_ms,
            };
            let decoded = LoadPdu::decode(&pdu.encode()).unwrap();
            prop_assert_eq!(pdu, decoded);
        }
    }
}
