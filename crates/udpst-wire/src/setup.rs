use bytes::{Buf, BufMut, BytesMut};

use crate::{checksum16, WireError, AUTH_DIGEST_LENGTH, SETUP_MAGIC};

/// Authentication mode carried in a [`SetupPdu`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthMode {
    None = 0,
    HmacSha256 = 1,
}

impl AuthMode {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::HmacSha256),
            _ => None,
        }
    }
}

/// `cmdRequest` values a Setup PDU may carry. `Request` marks the client's
/// half of the exchange; the server's reply carries `Response` in the same
/// field rather than echoing `Request` back (see `accept_setup_request` in
/// `udpst-core::control`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetupCmdRequest {
    Request = 1,
    Response = 2,
}

impl SetupCmdRequest {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Server response codes for a Setup Request, mirroring
/// `CHSR_CRSP_*` in the reference protocol header. The first eight
/// variants come straight off the retrieved header; `NoMaxBandwidth`
/// through `AllocationFailure` cover the remaining rejection kinds
/// `udpst_control.c::proc_setup_request` assigns (bandwidth required/
/// exceeded, multi-connection parameter mismatch, traditional-MTU
/// mismatch, and port allocation failure) but whose numeric constants
/// were not present in the retrieved header subset.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetupCmdResponse {
    Ack = 0,
    BadVersion = 1,
    BadJumboSettings = 2,
    AuthNotConfigured = 3,
    AuthRequired = 4,
    AuthInvalid = 5,
    AuthFailed = 6,
    AuthTimeExceeded = 7,
    NoMaxBandwidth = 8,
    BandwidthExceeded = 9,
    BadMultiConnParams = 10,
    BadTraditionalMtu = 11,
    AllocationFailure = 12,
}

impl SetupCmdResponse {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Ack),
            1 => Some(Self::BadVersion),
            2 => Some(Self::BadJumboSettings),
            3 => Some(Self::AuthNotConfigured),
            4 => Some(Self::AuthRequired),
            5 => Some(Self::AuthInvalid),
            6 => Some(Self::AuthFailed),
            7 => Some(Self::AuthTimeExceeded),
            8 => Some(Self::NoMaxBandwidth),
            9 => Some(Self::BandwidthExceeded),
            10 => Some(Self::BadMultiConnParams),
            11 => Some(Self::BadTraditionalMtu),
            12 => Some(Self::AllocationFailure),
            _ => None,
        }
    }
}

/// A single request/response exchange used to establish a new test
/// connection. Request and response share this same layout (the reference
/// protocol does too); an unanswered request carries `cmd_response = Ack`
/// and `test_port = 0` by convention.
#[derive(Clone, Debug, PartialEq)]
pub struct SetupPdu {
    pub protocol_version: u8,
    pub mc_index: u16,
    pub mc_count: u16,
    pub mc_ident: u32,
    pub cmd_request: u8,
    pub cmd_response: u8,
    /// High bit set means "upstream" (client sends, server receives); clear
    /// means downstream. Remaining bits carry the requested bandwidth cap.
    pub max_bandwidth: u32,
    pub jumbo: bool,
    pub traditional_mtu: bool,
    pub auth_mode: u8,
    pub auth_unix_time: u32,
    pub key_id: u8,
    pub test_port: u16,
    pub digest: [u8; AUTH_DIGEST_LENGTH],
}

const FIXED_LEN: usize = 2 // magic
    + 1 // version
    + 2 + 2 + 4 // mc_index, mc_count, mc_ident
    + 1 + 1 // cmdRequest, cmdResponse
    + 4 // maxBandwidth
    + 1 // modifierBitmap
    + 1 // authMode
    + 4 // authUnixTime
    + 1 // keyId
    + 2 // testPort
    + AUTH_DIGEST_LENGTH
    + 2; // checksum

const MODIFIER_JUMBO: u8 = 0b01;
const MODIFIER_TRADITIONAL_MTU: u8 = 0b10;
pub(crate) const MAX_BANDWIDTH_UPSTREAM_BIT: u32 = 0x8000_0000;

impl SetupPdu {
    pub const WIRE_LEN: usize = FIXED_LEN;

    pub fn upstream(&self) -> bool {
        self.max_bandwidth & MAX_BANDWIDTH_UPSTREAM_BIT != 0
    }

    pub fn bandwidth_value(&self) -> u32 {
        self.max_bandwidth & !MAX_BANDWIDTH_UPSTREAM_BIT
    }

    /// Packs a requested bandwidth cap and direction flag into the wire
    /// representation expected in `max_bandwidth`.
    pub fn encode_max_bandwidth(bandwidth_mbps: u32, upstream: bool) -> u32 {
        let bit = if upstream { MAX_BANDWIDTH_UPSTREAM_BIT } else { 0 };
        (bandwidth_mbps & !MAX_BANDWIDTH_UPSTREAM_BIT) | bit
    }

    pub fn auth_mode(&self) -> Option<AuthMode> {
        AuthMode::from_u8(self.auth_mode)
    }

    pub fn cmd_request(&self) -> Option<SetupCmdRequest> {
        SetupCmdRequest::from_u8(self.cmd_request)
    }

    pub fn cmd_response(&self) -> Option<SetupCmdResponse> {
        SetupCmdResponse::from_u8(self.cmd_response)
    }

    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(Self::WIRE_LEN);
        out.put_u16(SETUP_MAGIC);
        out.put_u8(self.protocol_version);
        out.put_u16(self.mc_index);
        out.put_u16(self.mc_count);
        out.put_u32(self.mc_ident);
        out.put_u8(self.cmd_request);
        out.put_u8(self.cmd_response);
        out.put_u32(self.max_bandwidth);
        let mut modifiers = 0u8;
        if self.jumbo {
            modifiers |= MODIFIER_JUMBO;
        }
        if self.traditional_mtu {
            modifiers |= MODIFIER_TRADITIONAL_MTU;
        }
        out.put_u8(modifiers);
        out.put_u8(self.auth_mode);
        out.put_u32(self.auth_unix_time);
        out.put_u8(self.key_id);
        out.put_u16(self.test_port);
        out.put_slice(&self.digest);
        out.put_u16(0); // checksum placeholder

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
        if magic != SETUP_MAGIC {
            return Err(WireError::BadMagic { expected: SETUP_MAGIC, got: magic });
        }
        let protocol_version = cur.get_u8();
        let mc_index = cur.get_u16();
        let mc_count = cur.get_u16();
        let mc_ident = cur.get_u32();
        let cmd_request = cur.get_u8();
        if SetupCmdRequest::from_u8(cmd_request).is_none() {
            return Err(WireError::BadCmdRequest(cmd_request));
        }
        let cmd_response = cur.get_u8();
        let max_bandwidth = cur.get_u32();
        let modifiers = cur.get_u8();
        let auth_mode = cur.get_u8();
        let auth_unix_time = cur.get_u32();
        let key_id = cur.get_u8();
        let test_port = cur.get_u16();
        let mut digest = [0u8; AUTH_DIGEST_LENGTH];
        cur.copy_to_slice(&mut digest);
        let _checksum = cur.get_u16();

        Ok(Self {
            protocol_version,
            mc_index,
            mc_count,
            mc_ident,
            cmd_request,
            cmd_response,
            max_bandwidth,
            jumbo: modifiers & MODIFIER_JUMBO != 0,
            traditional_mtu: modifiers & MODIFIER_TRADITIONAL_MTU != 0,
            auth_mode,
            auth_unix_time,
            key_id,
            test_port,
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SetupPdu {
        SetupPdu {
            protocol_version: 3,
            mc_index: 1,
            mc_count: 4,
            mc_ident: 0xDEAD_BEEF,
            cmd_request: 1,
            cmd_response: SetupCmdResponse::Ack as u8,
            max_bandwidth: 100_000 | MAX_BANDWIDTH_UPSTREAM_BIT,
            jumbo: true,
            traditional_mtu: false,
            auth_mode: AuthMode::HmacSha256 as u8,
            auth_unix_time: 1_700_000_000,
            key_id: 2,
            test_port: 45000,
            digest: [7u8; AUTH_DIGEST_LENGTH],
        }
    }

    #[test]
    fn round_trips() {
        let pdu = sample();
        let encoded = pdu.encode();
        let decoded = SetupPdu::decode(&encoded).unwrap();
        assert_eq!(pdu, decoded);
        assert!(decoded.upstream());
        assert_eq!(decoded.bandwidth_value(), 100_000);
    }

    #[test]
    fn rejects_wrong_size() {
        let mut bytes = sample().encode();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(SetupPdu::decode(&bytes), Err(WireError::TooShort { .. })));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut bytes = sample().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(SetupPdu::decode(&bytes), Err(WireError::BadChecksum));
    }
}
