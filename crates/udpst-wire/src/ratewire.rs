//! Shared wire encoding for an embedded [`SendingRate`] row, used by both the
//! Test Activation PDU (server-initial row) and the Status PDU
//! (server-to-client echo of the active row).

use bytes::{Buf, BufMut};
use udpst_rate_table::SendingRate;

/// Encoded size of a [`SendingRate`] row: seven big-endian `u32` fields.
pub const SENDING_RATE_WIRE_LEN: usize = 7 * 4;

pub fn put_sending_rate(out: &mut impl BufMut, rate: &SendingRate) {
    out.put_u32(rate.tx_interval1);
    out.put_u32(rate.udp_payload1);
    out.put_u32(rate.burst_size1);
    out.put_u32(rate.tx_interval2);
    out.put_u32(rate.udp_payload2);
    out.put_u32(rate.burst_size2);
    out.put_u32(rate.udp_addon2);
}

pub fn get_sending_rate(buf: &mut impl Buf) -> SendingRate {
    SendingRate {
        tx_interval1: buf.get_u32(),
        udp_payload1: buf.get_u32(),
        burst_size1: buf.get_u32(),
        tx_interval2: buf.get_u32(),
        udp_payload2: buf.get_u32(),
        burst_size2: buf.get_u32(),
        udp_addon2: buf.get_u32(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn sending_rate_round_trips_through_the_wire_including_the_randomize_bit(
            tx_interval1 in any::<u32>(),
            udp_payload1 in any::<u32>(),
            burst_size1 in any::<u32>(),
            tx_interval2 in any::<u32>(),
            udp_payload2 in any::<u32>(),
            burst_size2 in any::<u32>(),
            udp_addon2 in any::<u32>(),
        ) {
            let rate = SendingRate {
                tx_interval1,
                udp_payload1,
                burst_size1,
                tx_interval2,
                udp_payload2,
                burst_size2,
                udp_addon2,
            };
            let mut buf = bytes::BytesMut::with_capacity(SENDING_RATE_WIRE_LEN);
            put_sending_rate(&mut buf, &rate);
            prop_assert_eq!(buf.len(), SENDING_RATE_WIRE_LEN);
            let decoded = get_sending_rate(&mut buf.freeze());
            prop_assert_eq!(decoded, rate);
            // The randomize bit is just bit 31 of the raw field; confirm it
            // survives independently of whatever the low bits happen to be.
            prop_assert_eq!(
                decoded.udp_payload1 & 0x8000_0000 != 0,
                udp_payload1 & 0x8000_0000 != 0
            );
        }
    }
}
