/// 16-bit one's-complement checksum over `buf`, treating it as a stream of
/// big-endian 16-bit words (odd trailing byte padded with zero), with
/// end-around carry folding — the same algorithm IP/UDP checksums use.
///
/// Callers compute this with the PDU's checksum field zeroed, then store the
/// result in that field; verifying re-runs the same computation over the
/// received bytes (checksum field included) and expects zero.
pub fn checksum16(buf: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = buf.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = *chunks.remainder() {
        sum += (last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_buffer_checksum_is_all_ones_complement_of_zero() {
        assert_eq!(checksum16(&[0; 16]), 0xFFFF);
    }

    #[test]
    fn verifying_over_buffer_with_checksum_written_in_yields_zero() {
        let mut buf = vec![0u8; 20];
        buf[4] = 0xAB;
        buf[5] = 0xCD;
        buf[18] = 0;
        buf[19] = 0;
        let sum = checksum16(&buf);
        buf[18] = (sum >> 8) as u8;
        buf[19] = (sum & 0xFF) as u8;
        assert_eq!(checksum16(&buf), 0);
    }

    #[test]
    fn odd_length_buffer_pads_trailing_byte() {
        let a = checksum16(&[0x12, 0x34, 0x56]);
        let b = checksum16(&[0x12, 0x34, 0x56, 0x00]);
        assert_eq!(a, b);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn writing_the_computed_sum_back_in_always_verifies_to_zero(
            mut buf in proptest::collection::vec(any::<u8>(), 2..512),
            offset in 0usize..256,
        ) {
            let offset = (offset % (buf.len() - 1)).min(buf.len() - 2);
            buf[offset] = 0;
            buf[offset + 1] = 0;
            let sum = checksum16(&buf);
            buf[offset] = (sum >> 8) as u8;
            buf[offset + 1] = (sum & 0xFF) as u8;
            prop_assert_eq!(checksum16(&buf), 0);
        }
    }
}
