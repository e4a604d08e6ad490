//! Load Generator (C6).
//!
//! # Why
//! Every send-timer fire must turn one sending-rate row into the exact
//! bytes-on-the-wire for a burst, including the optional per-datagram size
//! randomization and the IPv6 payload reduction, without any of that logic
//! leaking into the event loop or the rate-adjustment engine.
//!
//! # What
//! [`BurstPlan`] decides, for one timer fire, how many datagrams of what
//! size to send (honoring the stop-path clamp to a single datagram).
//! [`build_burst`] renders that plan into encoded `LoadPdu` byte buffers
//! using a caller-owned [`rand::RngCore`], so tests can supply a seeded
//! deterministic source.
//!
//! # How
//! Grounded on `send_loadpdu`: the payload high bit selects a uniform draw
//! in `[MIN_PAYLOAD_SIZE, stored_max]`; the add-on carries the same kind of
//! high bit and is redrawn independently, once per datagram; IPv6 reduces
//! the chosen size by `IPV6_ADDSIZE`; during a stop phase the burst clamps
//! to one datagram and the add-on is dropped.

use rand::RngCore;
use udpst_rate_table::SendingRate;
use udpst_wire::{LoadPdu, TestAction};

use crate::time::Timestamp;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transmitter {
    One,
    Two,
}

/// Everything `build_burst` needs beyond the rate row itself.
#[derive(Clone, Copy, Debug)]
pub struct BurstContext {
    pub transmitter: Transmitter,
    pub ipv6: bool,
    pub stopping: bool,
    pub test_action: TestAction,
    pub next_seq_no: u32,
    pub last_spdu_seq_err: u32,
    pub last_status_send_time: Timestamp,
    pub now: Timestamp,
    pub rtt_response_delay_ms: u32,
}

/// Resolves a rate row plus transmitter selection into a concrete datagram
/// plan: how many base-size datagrams, and whether an add-on (transmitter 2
/// only) should also go out this fire.
#[derive(Clone, Copy, Debug)]
pub struct BurstPlan {
    pub count: u32,
    pub payload_min: u32,
    pub payload_max: u32,
    pub randomized: bool,
    pub addon_max: Option<u32>,
    pub addon_min: u32,
    pub addon_randomized: bool,
}

impl BurstPlan {
    pub fn resolve(rate: &SendingRate, ctx: &BurstContext) -> Self {
        let (mut count, max, randomized) = match ctx.transmitter {
            Transmitter::One => (rate.burst_size1, rate.payload1(), rate.payload1_randomized()),
            Transmitter::Two => (rate.burst_size2, rate.payload2(), rate.payload2_randomized()),
        };

        let addon_max = if ctx.transmitter == Transmitter::Two && !ctx.stopping && rate.addon2() > 0 {
            Some(apply_ipv6_reduction(rate.addon2(), ctx.ipv6))
        } else {
            None
        };

        if ctx.stopping {
            count = count.min(1);
        }

        let max = apply_ipv6_reduction(max, ctx.ipv6);
        Self {
            count,
            payload_min: udpst_rate_table::MIN_PAYLOAD_SIZE.min(max),
            payload_max: max,
            randomized,
            addon_min: udpst_rate_table::MIN_PAYLOAD_SIZE.min(addon_max.unwrap_or(0)),
            addon_max,
            addon_randomized: rate.addon2_randomized(),
        }
    }
}

fn apply_ipv6_reduction(size: u32, ipv6: bool) -> u32 {
    if ipv6 && size >= udpst_rate_table::MIN_PAYLOAD_SIZE {
        size.saturating_sub(udpst_rate_table::IPV6_ADDSIZE)
    } else {
        size
    }
}

/// Renders `plan` into a sequence of encoded Load PDU byte buffers (header
/// plus zero-filled or pseudo-random body out to the chosen payload size).
/// `next_seq_no` is consumed in order, one per datagram including the
/// add-on.
pub fn build_burst(
    plan: &BurstPlan,
    ctx: &BurstContext,
    rng: &mut dyn RngCore,
    randomize_content: bool,
) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(plan.count as usize + 1);
    let mut seq = ctx.next_seq_no;

    for _ in 0..plan.count {
        if plan.payload_max == 0 {
            break;
        }
        let size = draw_size(plan, rng);
        out.push(encode_datagram(seq, size, ctx, rng, randomize_content));
        seq = seq.wrapping_add(1);
    }

    if let Some(addon_max) = plan.addon_max {
        if addon_max > 0 {
            let addon_size = draw_addon_size(plan, rng);
            out.push(encode_datagram(seq, addon_size, ctx, rng, randomize_content));
        }
    }

    out
}

fn draw_size(plan: &BurstPlan, rng: &mut dyn RngCore) -> u32 {
    draw_uniform(plan.randomized, plan.payload_min, plan.payload_max, rng)
}

fn draw_addon_size(plan: &BurstPlan, rng: &mut dyn RngCore) -> u32 {
    draw_uniform(plan.addon_randomized, plan.addon_min, plan.addon_max.unwrap_or(0), rng)
}

fn draw_uniform(randomized: bool, min: u32, max: u32, rng: &mut dyn RngCore) -> u32 {
    if randomized && max > min {
        min + (rng.next_u32() % (max - min + 1))
    } else {
        max
    }
}

fn encode_datagram(
    seq: u32,
    payload_size: u32,
    ctx: &BurstContext,
    rng: &mut dyn RngCore,
    randomize_content: bool,
) -> Vec<u8> {
    let header = LoadPdu {
        test_action: ctx.test_action as u8,
        rx_stopped: false,
        lpdu_seq_no: seq,
        udp_payload: payload_size,
        spdu_seq_err: ctx.last_spdu_seq_err,
        spdu_time_sec: ctx.last_status_send_time.secs as u32,
        spdu_time_nsec: ctx.last_status_send_time.nanos,
        lpdu_time_sec: ctx.now.secs as u32,
        lpdu_time_nsec: ctx.now.nanos,
        rtt_response_delay_ms: ctx.rtt_response_delay_ms,
    };
    let mut buf = header.encode().to_vec();
    let body_len = (payload_size as usize).saturating_sub(buf.len());
    let mut body = vec![0u8; body_len];
    if randomize_content && !body.is_empty() {
        rng.fill_bytes(&mut body);
    }
    buf.extend_from_slice(&body);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ctx(transmitter: Transmitter, stopping: bool) -> BurstContext {
        BurstContext {
            transmitter,
            ipv6: false,
            stopping,
            test_action: if stopping { TestAction::Stop1 } else { TestAction::Test },
            next_seq_no: 0,
            last_spdu_seq_err: 0,
            last_status_send_time: Timestamp::ZERO,
            now: Timestamp::new(10, 0),
            rtt_response_delay_ms: 0,
        }
    }

    #[test]
    fn stopping_clamps_burst_to_one_and_drops_addon() {
        let rate = SendingRate {
            tx_interval2: 1000,
            udp_payload2: 500,
            burst_size2: 5,
            udp_addon2: 200,
            ..SendingRate::default()
        };
        let plan = BurstPlan::resolve(&rate, &ctx(Transmitter::Two, true));
        assert_eq!(plan.count, 1);
        assert!(plan.addon_max.is_none());
    }

    #[test]
    fn ipv6_reduces_payload_size() {
        let rate = SendingRate {
            tx_interval1: 100,
            udp_payload1: 1000,
            burst_size1: 1,
            ..SendingRate::default()
        };
        let mut ipv6_ctx = ctx(Transmitter::One, false);
        ipv6_ctx.ipv6 = true;
        let plan = BurstPlan::resolve(&rate, &ipv6_ctx);
        assert_eq!(plan.payload_max, 1000 - udpst_rate_table::IPV6_ADDSIZE);
    }

    #[test]
    fn randomized_addon_draws_within_bounds_and_varies_per_datagram() {
        let rate = SendingRate {
            tx_interval2: 50_000,
            udp_addon2: 1200 | udpst_rate_table::RANDOMIZE_BIT,
            ..SendingRate::default()
        };
        let c = ctx(Transmitter::Two, false);
        let plan = BurstPlan::resolve(&rate, &c);
        assert!(plan.addon_randomized);

        let mut rng = StdRng::seed_from_u64(1);
        let mut sizes = Vec::new();
        for _ in 0..20 {
            let datagrams = build_burst(&plan, &c, &mut rng, false);
            assert_eq!(datagrams.len(), 1);
            let declared = u32::from_be_bytes([datagrams[0][6], datagrams[0][7], datagrams[0][8], datagrams[0][9]]);
            assert!(declared >= udpst_rate_table::MIN_PAYLOAD_SIZE && declared <= 1200);
            sizes.push(declared);
        }
        assert!(sizes.iter().any(|&s| s != sizes[0]), "addon size never varied across redraws");
    }

    #[test]
    fn sequence_numbers_are_consumed_in_order() {
        let rate = SendingRate {
            tx_interval1: 100,
            udp_payload1: 1222,
            burst_size1: 3,
            ..SendingRate::default()
        };
        let c = ctx(Transmitter::One, false);
        let plan = BurstPlan::resolve(&rate, &c);
        let mut rng = StdRng::seed_from_u64(1);
        let datagrams = build_burst(&plan, &c, &mut rng, false);
        assert_eq!(datagrams.len(), 3);
        let seq = |d: &[u8]| u32::from_be_bytes([d[2], d[3], d[4], d[5]]);
        assert_eq!(seq(&datagrams[0]), 0);
        assert_eq!(seq(&datagrams[1]), 1);
        assert_eq!(seq(&datagrams[2]), 2);
    }
}
