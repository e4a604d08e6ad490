//! Aggregator & Reporter (C9): client-side merge of per-connection
//! sub-interval statistics into a running summary and bimodal maximum-rate
//! snapshot.
//!
//! # Why
//! A multi-connection test (`-C N`) needs one place that turns N
//! independently-ticking receivers' sub-interval outputs into a single
//! capacity number; keeping that merge as a pure accumulator (no socket, no
//! timer) means it can be driven directly from a vector of
//! [`crate::receiver::ReceiverStats::last_saved`] snapshots in a test.
//!
//! # What
//! [`LayerOverhead`] names the four per-datagram overhead figures the
//! reference implementation reports rate at (L3/IP, L2/Ethernet, L1/Ethernet
//! with preamble+IFG, L0/Ethernet with VLAN tag). [`Aggregator::fold_sub_interval`]
//! merges one round of per-connection [`udpst_wire::SubIntervalStats`] into
//! a [`SubIntervalRecord`] and updates the running [`TestSummary`] and
//! [`BimodalTracker`].
//!
//! # How
//! Grounded on `udpst_data.c::get_rate` (`(dgrams*overhead + bytes) * 8 /
//! delta_usec`, summed per layer across connections into
//! `repo.siAggRateL{3,2,1,0}`) and the bimodal-maximum bookkeeping in
//! `save_rcv_stats` (`conf.bimodalCount` splits sub-interval index 1..N into
//! a first segment and remainder, each keeping its own running maximum).

use udpst_rate_table::L3DG_OVERHEAD;
use udpst_wire::SubIntervalStats;

/// Ethernet framing overhead beyond UDP/IPv4, in bytes.
pub const L2_ETH_OVERHEAD: u32 = 18;
/// Additional preamble + inter-frame-gap overhead charged at L1.
pub const L1_PREAMBLE_IFG_OVERHEAD: u32 = 20;
/// Additional 802.1Q VLAN tag overhead charged at L0.
pub const L0_VLAN_OVERHEAD: u32 = 4;

pub const L2DG_OVERHEAD: u32 = L3DG_OVERHEAD + L2_ETH_OVERHEAD;
pub const L1DG_OVERHEAD: u32 = L2DG_OVERHEAD + L1_PREAMBLE_IFG_OVERHEAD;
pub const L0DG_OVERHEAD: u32 = L1DG_OVERHEAD + L0_VLAN_OVERHEAD;

/// Computes an Mbps rate from a sub-interval's datagram count, byte count,
/// and elapsed microseconds, charging `overhead` bytes against every
/// datagram.
///
/// `ipv6` adds [`udpst_rate_table::IPV6_ADDSIZE`] to `overhead`, matching the
/// reference's fair-sizing adjustment for the larger IPv6 header.
pub fn rate_mbps(datagrams: u32, bytes: u64, overhead: u32, duration_usec: u64, ipv6: bool) -> f64 {
    if duration_usec == 0 {
        return 0.0;
    }
    let overhead = overhead + if ipv6 { udpst_rate_table::IPV6_ADDSIZE } else { 0 };
    let weighted_bytes = datagrams as f64 * overhead as f64 + bytes as f64;
    (weighted_bytes * 8.0) / duration_usec as f64
}

/// One test connection's contribution to a sub-interval, already reduced to
/// the fields the aggregator needs (duration converted to microseconds by
/// the caller, since [`SubIntervalStats::duration_ms`] is millisecond
/// granularity and `rate_mbps` wants microseconds for precision parity with
/// the reference implementation's timestamp-delta arithmetic).
#[derive(Clone, Copy, Debug)]
pub struct ConnectionContribution {
    pub rx_datagrams: u32,
    pub rx_bytes: u64,
    pub duration_usec: u64,
    pub delay_var_min_ms: u32,
    pub delay_var_max_ms: u32,
    pub rtt_min_ms: u32,
    pub rtt_max_ms: u32,
    pub seq_err_loss: u32,
    pub seq_err_ooo: u32,
    pub seq_err_dup: u32,
}

impl ConnectionContribution {
    pub fn from_saved(saved: &SubIntervalStats) -> Self {
        Self {
            rx_datagrams: saved.rx_datagrams,
            rx_bytes: saved.rx_bytes,
            duration_usec: saved.duration_ms as u64 * 1_000,
            delay_var_min_ms: saved.delay_var_min_ms,
            delay_var_max_ms: saved.delay_var_max_ms,
            rtt_min_ms: saved.rtt_min_ms,
            rtt_max_ms: saved.rtt_max_ms,
            seq_err_loss: saved.seq_err_loss,
            seq_err_ooo: saved.seq_err_ooo,
            seq_err_dup: saved.seq_err_dup,
        }
    }
}

/// One merged sub-interval across every active test connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubIntervalRecord {
    pub rate_l3_mbps: f64,
    pub rate_l2_mbps: f64,
    pub rate_l1_mbps: f64,
    pub rate_l0_mbps: f64,
    pub seq_err_loss: u32,
    pub seq_err_ooo: u32,
    pub seq_err_dup: u32,
    pub delay_var_min_ms: u32,
    pub delay_var_max_ms: u32,
    pub rtt_min_ms: u32,
    pub rtt_max_ms: u32,
}

/// Running sums over every sub-interval seen so far, reported at test end.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestSummary {
    pub total_loss: u64,
    pub total_ooo: u64,
    pub total_dup: u64,
    pub delay_var_min_ms: Option<u32>,
    pub delay_var_max_ms: u32,
    pub rtt_min_ms: Option<u32>,
    pub rtt_max_ms: u32,
    rate_l3_sum: f64,
    sample_count: u32,
}

impl TestSummary {
    pub fn fold(&mut self, record: &SubIntervalRecord) {
        self.total_loss += record.seq_err_loss as u64;
        self.total_ooo += record.seq_err_ooo as u64;
        self.total_dup += record.seq_err_dup as u64;
        self.delay_var_min_ms = Some(self.delay_var_min_ms.map_or(record.delay_var_min_ms, |m| m.min(record.delay_var_min_ms)));
        self.delay_var_max_ms = self.delay_var_max_ms.max(record.delay_var_max_ms);
        self.rtt_min_ms = Some(self.rtt_min_ms.map_or(record.rtt_min_ms, |m| m.min(record.rtt_min_ms)));
        self.rtt_max_ms = self.rtt_max_ms.max(record.rtt_max_ms);
        self.rate_l3_sum += record.rate_l3_mbps;
        self.sample_count += 1;
    }

    pub fn mean_l3_mbps(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.rate_l3_sum / self.sample_count as f64
        }
    }
}

/// One segment's running maximum-rate snapshot, keyed to the sub-interval
/// it was observed in.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaxSnapshot {
    pub rate_l3_mbps: f64,
    pub rate_l2_mbps: f64,
    pub rate_l1_mbps: f64,
    pub rate_l0_mbps: f64,
    pub seq_err_loss: u32,
    pub seq_err_ooo: u32,
    pub seq_err_dup: u32,
    pub delay_var_max_ms: u32,
    pub rtt_max_ms: u32,
    pub sub_interval_index: u32,
}

/// Bimodal (or single-segment) maximum-rate tracker. With `split = 0` every
/// sub-interval feeds the one segment, matching `conf.bimodalCount == 0`'s
/// single-maximum report; with `split > 0`, sub-interval indices `1..=split`
/// feed segment 0 and the remainder feed segment 1.
#[derive(Clone, Debug, Default)]
pub struct BimodalTracker {
    split: u32,
    segments: Vec<MaxSnapshot>,
}

impl BimodalTracker {
    pub fn new(split: u32) -> Self {
        let segment_count = if split > 0 { 2 } else { 1 };
        Self { split, segments: vec![MaxSnapshot::default(); segment_count] }
    }

    fn segment_for(&self, sub_interval_index: u32) -> usize {
        if self.split > 0 && sub_interval_index > self.split {
            1
        } else {
            0
        }
    }

    pub fn fold(&mut self, sub_interval_index: u32, record: &SubIntervalRecord) {
        let segment = self.segment_for(sub_interval_index);
        let current = &mut self.segments[segment];
        if record.rate_l3_mbps > current.rate_l3_mbps {
            *current = MaxSnapshot {
                rate_l3_mbps: record.rate_l3_mbps,
                rate_l2_mbps: record.rate_l2_mbps,
                rate_l1_mbps: record.rate_l1_mbps,
                rate_l0_mbps: record.rate_l0_mbps,
                seq_err_loss: record.seq_err_loss,
                seq_err_ooo: record.seq_err_ooo,
                seq_err_dup: record.seq_err_dup,
                delay_var_max_ms: record.delay_var_max_ms,
                rtt_max_ms: record.rtt_max_ms,
                sub_interval_index,
            };
        }
    }

    pub fn snapshots(&self) -> &[MaxSnapshot] {
        &self.segments
    }
}

/// The virtual, socketless connection the client side holds for the whole
/// test: merges every real connection's sub-interval output, keeps the
/// running summary and bimodal maximum tracker, and owns the per-sub-interval
/// record history for the final report.
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    ipv6: bool,
    history: Vec<SubIntervalRecord>,
    summary: TestSummary,
    bimodal: Option<BimodalTracker>,
}

impl Aggregator {
    pub fn new(ipv6: bool, bimodal_split: u32) -> Self {
        Self {
            ipv6,
            history: Vec::new(),
            summary: TestSummary::default(),
            bimodal: Some(BimodalTracker::new(bimodal_split)),
        }
    }

    /// Merges one round of per-connection contributions (already read out of
    /// each connection's `last_saved` sub-interval stats) into the next
    /// history entry, folds it into the running summary and bimodal tracker,
    /// and returns the merged record.
    pub fn fold_sub_interval(&mut self, contributions: &[ConnectionContribution]) -> SubIntervalRecord {
        let mut record = SubIntervalRecord::default();
        let mut delay_min: Option<u32> = None;
        let mut rtt_min: Option<u32> = None;

        for c in contributions {
            record.rate_l3_mbps += rate_mbps(c.rx_datagrams, c.rx_bytes, L3DG_OVERHEAD, c.duration_usec, self.ipv6);
            record.rate_l2_mbps += rate_mbps(c.rx_datagrams, c.rx_bytes, L2DG_OVERHEAD, c.duration_usec, self.ipv6);
            record.rate_l1_mbps += rate_mbps(c.rx_datagrams, c.rx_bytes, L1DG_OVERHEAD, c.duration_usec, self.ipv6);
            record.rate_l0_mbps += rate_mbps(c.rx_datagrams, c.rx_bytes, L0DG_OVERHEAD, c.duration_usec, self.ipv6);
            record.seq_err_loss += c.seq_err_loss;
            record.seq_err_ooo += c.seq_err_ooo;
            record.seq_err_dup += c.seq_err_dup;
            delay_min = Some(delay_min.map_or(c.delay_var_min_ms, |m| m.min(c.delay_var_min_ms)));
            record.delay_var_max_ms = record.delay_var_max_ms.max(c.delay_var_max_ms);
            rtt_min = Some(rtt_min.map_or(c.rtt_min_ms, |m| m.min(c.rtt_min_ms)));
            record.rtt_max_ms = record.rtt_max_ms.max(c.rtt_max_ms);
        }
        record.delay_var_min_ms = delay_min.unwrap_or(0);
        record.rtt_min_ms = rtt_min.unwrap_or(0);

        self.summary.fold(&record);
        let index = self.history.len() as u32 + 1;
        if let Some(bimodal) = self.bimodal.as_mut() {
            bimodal.fold(index, &record);
        }
        self.history.push(record);
        record
    }

    pub fn history(&self) -> &[SubIntervalRecord] {
        &self.history
    }

    pub fn summary(&self) -> &TestSummary {
        &self.summary
    }

    pub fn bimodal_snapshots(&self) -> &[MaxSnapshot] {
        self.bimodal.as_ref().map(BimodalTracker::snapshots).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(dgrams: u32, bytes: u64, usec: u64) -> ConnectionContribution {
        ConnectionContribution {
            rx_datagrams: dgrams,
            rx_bytes: bytes,
            duration_usec: usec,
            delay_var_min_ms: 1,
            delay_var_max_ms: 5,
            rtt_min_ms: 2,
            rtt_max_ms: 8,
            seq_err_loss: 0,
            seq_err_ooo: 0,
            seq_err_dup: 0,
        }
    }

    #[test]
    fn rate_mbps_matches_hand_computation() {
        // 100 datagrams * 28 overhead + 100_000 payload bytes, over 1s, *8 bits.
        let mbps = rate_mbps(100, 100_000, L3DG_OVERHEAD, 1_000_000, false);
        let expected = ((100.0 * L3DG_OVERHEAD as f64 + 100_000.0) * 8.0) / 1_000_000.0;
        assert!((mbps - expected).abs() < 1e-9);
    }

    #[test]
    fn ipv6_adds_extra_overhead_per_datagram() {
        let v4 = rate_mbps(100, 100_000, L3DG_OVERHEAD, 1_000_000, false);
        let v6 = rate_mbps(100, 100_000, L3DG_OVERHEAD, 1_000_000, true);
        assert!(v6 > v4);
    }

    #[test]
    fn layer_rates_increase_with_overhead() {
        let mut agg = Aggregator::new(false, 0);
        let record = agg.fold_sub_interval(&[contribution(1000, 1_000_000, 1_000_000)]);
        assert!(record.rate_l0_mbps > record.rate_l1_mbps);
        assert!(record.rate_l1_mbps > record.rate_l2_mbps);
        assert!(record.rate_l2_mbps > record.rate_l3_mbps);
    }

    #[test]
    fn aggregate_sums_across_connections() {
        let mut agg = Aggregator::new(false, 0);
        let record = agg.fold_sub_interval(&[
            contribution(500, 500_000, 1_000_000),
            contribution(500, 500_000, 1_000_000),
        ]);
        let single = rate_mbps(500, 500_000, L3DG_OVERHEAD, 1_000_000, false);
        assert!((record.rate_l3_mbps - 2.0 * single).abs() < 1e-9);
    }

    #[test]
    fn single_segment_tracks_one_running_maximum() {
        let mut agg = Aggregator::new(false, 0);
        agg.fold_sub_interval(&[contribution(100, 100_000, 1_000_000)]);
        agg.fold_sub_interval(&[contribution(1000, 1_000_000, 1_000_000)]);
        agg.fold_sub_interval(&[contribution(50, 50_000, 1_000_000)]);
        let snapshots = agg.bimodal_snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].sub_interval_index, 2);
    }

    #[test]
    fn bimodal_split_tracks_two_independent_maxima() {
        let mut agg = Aggregator::new(false, 2);
        agg.fold_sub_interval(&[contribution(1000, 1_000_000, 1_000_000)]); // segment 0, sub-interval 1
        agg.fold_sub_interval(&[contribution(100, 100_000, 1_000_000)]); // segment 0, sub-interval 2
        agg.fold_sub_interval(&[contribution(50, 50_000, 1_000_000)]); // segment 1, sub-interval 3
        agg.fold_sub_interval(&[contribution(2000, 2_000_000, 1_000_000)]); // segment 1, sub-interval 4
        let snapshots = agg.bimodal_snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].sub_interval_index, 1);
        assert_eq!(snapshots[1].sub_interval_index, 4);
    }

    #[test]
    fn running_summary_accumulates_loss_and_tracks_extrema() {
        let mut agg = Aggregator::new(false, 0);
        let mut a = contribution(100, 100_000, 1_000_000);
        a.seq_err_loss = 3;
        a.rtt_min_ms = 1;
        agg.fold_sub_interval(&[a]);
        let mut b = contribution(100, 100_000, 1_000_000);
        b.seq_err_loss = 2;
        b.rtt_min_ms = 5;
        agg.fold_sub_interval(&[b]);
        assert_eq!(agg.summary().total_loss, 5);
        assert_eq!(agg.summary().rtt_min_ms, Some(1));
    }
}
