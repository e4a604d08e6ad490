use bytes::{Buf, BufMut, BytesMut};
use udpst_rate_table::SendingRate;

use crate::ratewire::{get_sending_rate, put_sending_rate, SENDING_RATE_WIRE_LEN};
use crate::{checksum16, WireError, ACTIVATION_MAGIC};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActivationCmdRequest {
    ActivateUpstream = 1,
    ActivateDownstream = 2,
}

impl ActivationCmdRequest {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::ActivateUpstream),
            2 => Some(Self::ActivateDownstream),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActivationCmdResponse {
    Ack = 0,
    BadParam = 1,
}

impl ActivationCmdResponse {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Ack),
            1 => Some(Self::BadParam),
            _ => None,
        }
    }
}

/// Rate-adjustment algorithm identifier negotiated at activation time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RateAlgorithm {
    B = 0,
    C = 1,
}

impl RateAlgorithm {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::B),
            1 => Some(Self::C),
            _ => None,
        }
    }
}

/// Test Activation Request/Response: negotiates every per-test parameter
/// from §3 and carries the server's initial sending-rate row.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivationPdu {
    pub protocol_version: u8,
    pub cmd_request: u8,
    pub cmd_response: u8,
    pub low_thresh_ms: u32,
    pub upper_thresh_ms: u32,
    pub trial_interval_ms: u16,
    pub test_interval_s: u16,
    pub sub_interval_period_s: u8,
    pub ip_tos_byte: u8,
    pub sr_index_conf: u16,
    pub sr_index_is_start: bool,
    pub random_payload: bool,
    pub high_speed_delta: u8,
    pub slow_adjust_threshold: u16,
    pub seq_error_threshold: u16,
    pub algorithm: u8,
    pub one_way_delay: bool,
    pub ignore_oo_dup: bool,
    pub sending_rate: SendingRate,
}

const FIXED_LEN: usize = 2 // magic
    + 1 // version
    + 1 + 1 // cmdRequest, cmdResponse
    + 4 + 4 // low/upper thresh
    + 2 + 2 // trial interval, test interval
    + 1 + 1 // sub-interval period, ip tos
    + 2 // sr index conf
    + 1 // modifierBitmap
    + 1 // high speed delta
    + 2 + 2 // slow adjust threshold, seq error threshold
    + 1 // algorithm
    + 1 // strict boolean flags (one-way-delay, ignore-oo-dup) packed together
    + SENDING_RATE_WIRE_LEN
    + 2; // checksum

const MODIFIER_SR_INDEX_IS_START: u8 = 0b01;
const MODIFIER_RANDOM_PAYLOAD: u8 = 0b10;
const FLAG_ONE_WAY_DELAY: u8 = 0b01;
const FLAG_IGNORE_OO_DUP: u8 = 0b10;

impl ActivationPdu {
    pub const WIRE_LEN: usize = FIXED_LEN;

    pub fn cmd_request(&self) -> Option<ActivationCmdRequest> {
        ActivationCmdRequest::from_u8(self.cmd_request)
    }

    pub fn cmd_response(&self) -> Option<ActivationCmdResponse> {
        ActivationCmdResponse::from_u8(self.cmd_response)
    }

    pub fn algorithm(&self) -> Option<RateAlgorithm> {
        RateAlgorithm::from_u8(self.algorithm)
    }

    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(Self::WIRE_LEN);
        out.put_u16(ACTIVATION_MAGIC);
        out.put_u8(self.protocol_version);
        out.put_u8(self.cmd_request);
        out.put_u8(self.cmd_response);
        out.put_u32(self.low_thresh_ms);
        out.put_u32(self.upper_thresh_ms);
        out.put_u16(self.trial_interval_ms);
        out.put_u16(self.test_interval_s);
        out.put_u8(self.sub_interval_period_s);
        out.put_u8(self.ip_tos_byte);
        out.put_u16(self.sr_index_conf);
        let mut modifiers = 0u8;
        if self.sr_index_is_start {
            modifiers |= MODIFIER_SR_INDEX_IS_START;
        }
        if self.random_payload {
            modifiers |= MODIFIER_RANDOM_PAYLOAD;
        }
        out.put_u8(modifiers);
        out.put_u8(self.high_speed_delta);
        out.put_u16(self.slow_adjust_threshold);
        out.put_u16(self.seq_error_threshold);
        out.put_u8(self.algorithm);
        let mut flags = 0u8;
        if self.one_way_delay {
            flags |= FLAG_ONE_WAY_DELAY;
        }
        if self.ignore_oo_dup {
            flags |= FLAG_IGNORE_OO_DUP;
        }
        out.put_u8(flags);
        put_sending_rate(&mut out, &self.sending_rate);
        out.put_u16(0);

        let sum = checksum16(&out);
        let len = out.len();
        out[len - 2..].copy_from_slice(&sum.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(WireError::TooShort { got: buf.len(), want: Self::WIRE_LEN });
        }
        if buf.len() > Self::WIRE_LEN {
            return Err(WireError::TooLong { got: buf.len(), max: Self::WIRE_LEN });
        }

        let checksum_offset = Self::WIRE_LEN - 2;
        let received = u16::from_be_bytes([buf[checksum_offset], buf[checksum_offset + 1]]);
        if received != 0 {
            let mut verify = buf.to_vec();
            verify[checksum_offset..].copy_from_slice(&[0, 0]);
            if checksum16(&verify) != received {
                return Err(WireError::BadChecksum);
            }
        }

        let mut cur = buf;
        let magic = cur.get_u16();
        if magic != ACTIVATION_MAGIC {
            return Err(WireError::BadMagic { expected: ACTIVATION_MAGIC, got: magic });
        }
        let protocol_version = cur.get_u8();
        let cmd_request = cur.get_u8();
        if ActivationCmdRequest::from_u8(cmd_request).is_none() {
            return Err(WireError::BadCmdRequest(cmd_request));
        }
        let cmd_response = cur.get_u8();
        let low_thresh_ms = cur.get_u32();
        let upper_thresh_ms = cur.get_u32();
        let trial_interval_ms = cur.get_u16();
        let test_interval_s = cur.get_u16();
        let sub_interval_period_s = cur.get_u8();
        let ip_tos_byte = cur.get_u8();
        let sr_index_conf = cur.get_u16();
        let modifiers = cur.get_u8();
        let high_speed_delta = cur.get_u8();
        let slow_adjust_threshold = cur.get_u16();
        let seq_error_threshold = cur.get_u16();
        let algorithm = cur.get_u8();
        let flags = cur.get_u8();
        let sending_rate = get_sending_rate(&mut cur);
        let _checksum = cur.get_u16();

        Ok(Self {
            protocol_version,
            cmd_request,
            cmd_response,
            low_thresh_ms,
            upper_thresh_ms,
            trial_interval_ms,
            test_interval_s,
            sub_interval_period_s,
            ip_tos_byte,
            sr_index_conf,
            sr_index_is_start: modifiers & MODIFIER_SR_INDEX_IS_START != 0,
            random_payload: modifiers & MODIFIER_RANDOM_PAYLOAD != 0,
            high_speed_delta,
            slow_adjust_threshold,
            seq_error_threshold,
            algorithm,
            one_way_delay: flags & FLAG_ONE_WAY_DELAY != 0,
            ignore_oo_dup: flags & FLAG_IGNORE_OO_DUP != 0,
            sending_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ActivationPdu {
        ActivationPdu {
            protocol_version: 3,
            cmd_request: ActivationCmdRequest::ActivateDownstream as u8,
            cmd_response: ActivationCmdResponse::Ack as u8,
            low_thresh_ms: 30,
            upper_thresh_ms: 90,
            trial_interval_ms: 50,
            test_interval_s: 10,
            sub_interval_period_s: 1,
            ip_tos_byte: 0,
            sr_index_conf: u16::MAX,
            sr_index_is_start: true,
            random_payload: false,
            high_speed_delta: 10,
            slow_adjust_threshold: 2,
            seq_error_threshold: 0,
            algorithm: RateAlgorithm::B as u8,
            one_way_delay: true,
            ignore_oo_dup: false,
            sending_rate: SendingRate::default(),
        }
    }

    #[test]
    fn round_trips() {
        let pdu = sample();
        let encoded = pdu.encode();
        let decoded = ActivationPdu::decode(&encoded).unwrap();
        assert_eq!(pdu, decoded);
        assert_eq!(decoded.cmd_request(), Some(ActivationCmdRequest::ActivateDownstream));
        assert_eq!(decoded.algorithm(), Some(RateAlgorithm::B));
    }

    #[test]
    fn rejects_bad_cmd_request() {
        let mut bytes = sample().encode();
        bytes[3] = 99;
        let sum_offset = bytes.len() - 2;
        bytes[sum_offset..].copy_from_slice(&[0, 0]);
        let sum = checksum16(&bytes);
        bytes[sum_offset..].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(ActivationPdu::decode(&bytes), Err(WireError::BadCmdRequest(99)));
    }
}
