use bytes::{Buf, BufMut, BytesMut};
use udpst_rate_table::SendingRate;

use crate::load::TestAction;
use crate::ratewire::{get_sending_rate, put_sending_rate, SENDING_RATE_WIRE_LEN};
use crate::{WireError, STATUS_MAGIC};

/// The last-completed sub-interval's summary, attached to every Status PDU
/// so a receiver that missed one status PDU can still reconstruct the
/// timeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubIntervalStats {
    pub rx_datagrams: u32,
    pub rx_bytes: u64,
    pub delay_var_min_ms: u32,
    pub delay_var_max_ms: u32,
    pub delay_var_avg_ms: u32,
    pub rtt_min_ms: u32,
    pub rtt_max_ms: u32,
    pub seq_err_loss: u32,
    pub seq_err_ooo: u32,
    pub seq_err_dup: u32,
    pub duration_ms: u32,
}

const SUB_INTERVAL_STATS_WIRE_LEN: usize = 4 + 8 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4;

impl SubIntervalStats {
    fn encode(&self, out: &mut BytesMut) {
        out.put_u32(self.rx_datagrams);
        out.put_u64(self.rx_bytes);
        out.put_u32(self.delay_var_min_ms);
        out.put_u32(self.delay_var_max_ms);
        out.put_u32(self.delay_var_avg_ms);
        out.put_u32(self.rtt_min_ms);
        out.put_u32(self.rtt_max_ms);
        out.put_u32(self.seq_err_loss);
        out.put_u32(self.seq_err_ooo);
        out.put_u32(self.seq_err_dup);
        out.put_u32(self.duration_ms);
    }

    fn decode(cur: &mut impl Buf) -> Self {
        Self {
            rx_datagrams: cur.get_u32(),
            rx_bytes: cur.get_u64(),
            delay_var_min_ms: cur.get_u32(),
            delay_var_max_ms: cur.get_u32(),
            delay_var_avg_ms: cur.get_u32(),
            rtt_min_ms: cur.get_u32(),
            rtt_max_ms: cur.get_u32(),
            seq_err_loss: cur.get_u32(),
            seq_err_ooo: cur.get_u32(),
            seq_err_dup: cur.get_u32(),
            duration_ms: cur.get_u32(),
        }
    }
}

/// Periodic feedback datagram. Carries the active sending-rate row back to
/// the upstream sender (so the rate-adjustment engine, which always lives on
/// the transmitting side, knows what it last asked for) plus the receiver's
/// running and last-sub-interval statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusPdu {
    pub test_action: u8,
    pub rx_stopped: bool,
    pub spdu_seq_no: u32,
    pub sending_rate: SendingRate,
    pub sub_interval_seq_no: u32,
    pub saved: SubIntervalStats,
    pub seq_err_loss: u32,
    pub seq_err_ooo: u32,
    pub seq_err_dup: u32,
    pub clock_delta_min_ms: i32,
    pub delay_var_min_ms: u32,
    pub delay_var_max_ms: u32,
    pub delay_var_sum_ms: u64,
    pub delay_var_cnt: u32,
    pub rtt_minimum_ms: u32,
    pub rtt_sample_ms: u32,
    pub delay_min_updated: bool,
    pub trial_delta_time_ms: u32,
    pub trial_rx_datagrams: u32,
    pub trial_rx_bytes: u64,
    pub send_time_sec: u32,
    pub send_time_nsec: u32,
}

const FIXED_LEN: usize = 2 // magic
    + 1 + 1 // test_action, rx_stopped
    + 4 // spdu_seq_no
    + SENDING_RATE_WIRE_LEN
    + 4 // sub_interval_seq_no
    + SUB_INTERVAL_STATS_WIRE_LEN
    + 4 + 4 + 4 // seq_err loss/ooo/dup
    + 4 // clock_delta_min_ms
    + 4 + 4 + 8 + 4 // delay var min/max/sum/cnt
    + 4 + 4 // rtt minimum/sample
    + 1 // delay_min_updated
    + 4 + 4 + 8 // trial delta time/datagrams/bytes
    + 4 + 4; // send_time sec+nsec

impl StatusPdu {
    pub const WIRE_LEN: usize = FIXED_LEN;

    pub fn test_action(&self) -> Option<TestAction> {
        TestAction::from_u8(self.test_action)
    }

    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(Self::WIRE_LEN);
        out.put_u16(STATUS_MAGIC);
        out.put_u8(self.test_action);
        out.put_u8(self.rx_stopped as u8);
        out.put_u32(self.spdu_seq_no);
        put_sending_rate(&mut out, &self.sending_rate);
        out.put_u32(self.sub_interval_seq_no);
        self.saved.encode(&mut out);
        out.put_u32(self.seq_err_loss);
        out.put_u32(self.seq_err_ooo);
        out.put_u32(self.seq_err_dup);
        out.put_i32(self.clock_delta_min_ms);
        out.put_u32(self.delay_var_min_ms);
        out.put_u32(self.delay_var_max_ms);
        out.put_u64(self.delay_var_sum_ms);
        out.put_u32(self.delay_var_cnt);
        out.put_u32(self.rtt_minimum_ms);
        out.put_u32(self.rtt_sample_ms);
        out.put_u8(self.delay_min_updated as u8);
        out.put_u32(self.trial_delta_time_ms);
        out.put_u32(self.trial_rx_datagrams);
        out.put_u64(self.trial_rx_bytes);
        out.put_u32(self.send_time_sec);
        out.put_u32(self.send_time_nsec);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(WireError::TooShort { got: buf.len(), want: Self::WIRE_LEN });
        }
        if buf.len() > Self::WIRE_LEN {
            return Err(WireError::TooLong { got: buf.len(), max: Self::WIRE_LEN });
        }
        let mut cur = buf;
        let magic = cur.get_u16();
        if magic != STATUS_MAGIC {
            return Err(WireError::BadMagic { expected: STATUS_MAGIC, got: magic });
        }
        let test_action = cur.get_u8();
        let rx_stopped = cur.get_u8() != 0;
        let spdu_seq_no = cur.get_u32();
        let sending_rate = get_sending_rate(&mut cur);
        let sub_interval_seq_no = cur.get_u32();
        let saved = SubIntervalStats::decode(&mut cur);
        let seq_err_loss = cur.get_u32();
        let seq_err_ooo = cur.get_u32();
        let seq_err_dup = cur.get_u32();
        let clock_delta_min_ms = cur.get_i32();
        let delay_var_min_ms = cur.get_u32();
        let delay_var_max_ms = cur.get_u32();
        let delay_var_sum_ms = cur.get_u64();
        let delay_var_cnt = cur.get_u32();
        let rtt_minimum_ms = cur.get_u32();
        let rtt_sample_ms = cur.get_u32();
        let delay_min_updated = cur.get_u8() != 0;
        let trial_delta_time_ms = cur.get_u32();
        let trial_rx_datagrams = cur.get_u32();
        let trial_rx_bytes = cur.get_u64();
        let send_time_sec = cur.get_u32();
        let send_time_nsec = cur.get_u32();

        Ok(Self {
            test_action,
            rx_stopped,
            spdu_seq_no,
            sending_rate,
            sub_interval_seq_no,
            saved,
            seq_err_loss,
            seq_err_ooo,
            seq_err_dup,
            clock_delta_min_ms,
            delay_var_min_ms,
            delay_var_max_ms,
            delay_var_sum_ms,
            delay_var_cnt,
            rtt_minimum_ms,
            rtt_sample_ms,
            delay_min_updated,
            trial_delta_time_ms,
            trial_rx_datagrams,
            trial_rx_bytes,
            send_time_sec,
            send_time_nsec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatusPdu {
        StatusPdu {
            test_action: TestAction::Test as u8,
            rx_stopped: false,
            spdu_seq_no: 9,
            sending_rate: SendingRate::default(),
            sub_interval_seq_no: 3,
            saved: SubIntervalStats {
                rx_datagrams: 500,
                rx_bytes: 611_000,
                delay_var_min_ms: 1,
                delay_var_max_ms: 8,
                delay_var_avg_ms: 3,
                rtt_min_ms: 2,
                rtt_max_ms: 5,
                seq_err_loss: 0,
                seq_err_ooo: 1,
                seq_err_dup: 0,
                duration_ms: 1000,
            },
            seq_err_loss: 0,
            seq_err_ooo: 0,
            seq_err_dup: 0,
            clock_delta_min_ms: -12,
            delay_var_min_ms: u32::MAX,
            delay_var_max_ms: 0,
            delay_var_sum_ms: 0,
            delay_var_cnt: 0,
            rtt_minimum_ms: u32::MAX,
            rtt_sample_ms: 0,
            delay_min_updated: false,
            trial_delta_time_ms: 50,
            trial_rx_datagrams: 25,
            trial_rx_bytes: 30_550,
            send_time_sec: 1_700_000_000,
            send_time_nsec: 250_000_000,
        }
    }

    #[test]
    fn round_trips() {
        let pdu = sample();
        let encoded = pdu.encode();
        let decoded = StatusPdu::decode(&encoded).unwrap();
        assert_eq!(pdu, decoded);
    }

    #[test]
    fn negative_clock_delta_round_trips() {
        let pdu = sample();
        let encoded = pdu.encode();
        let decoded = StatusPdu::decode(&encoded).unwrap();
        assert_eq!(decoded.clock_delta_min_ms, -12);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn arbitrary_fields_round_trip(
            spdu_seq_no in any::<u32>(),
            seq_err_loss in any::<u32>(),
            seq_err_ooo in any::<u32>(),
            seq_err_dup in any::<u32>(),
            clock_delta_min_ms in any::<i32>(),
            rtt_minimum_ms in any::<u32>(),
            trial_rx_bytes in any::<u64>(),
            delay_min_updated in any::<bool>(),
        ) {
            let mut pdu = sample();
            pdu.spdu_seq_no = spdu_seq_no;
            pdu.seq_err_loss = seq_err_loss;
            pdu.seq_err_ooo = seq_err_ooo;
            pdu.seq_err_dup = seq_err_dup;
            pdu.clock_delta_min_ms = clock_delta_min_ms;
            pdu.rtt_minimum_ms = rtt_minimum_ms;
            pdu.trial_rx_bytes = trial_rx_bytes;
            pdu.delay_min_updated = delay_min_updated;

            let decoded = StatusPdu::decode(&pdu.encode()).unwrap();
            prop_assert_eq!(pdu, decoded);
        }
    }
}
