//! Receiver / Statistics (C7).
//!
//! # Why
//! The receiving side of every load-PDU stream needs sequence-loss/reorder/
//! duplicate accounting, one-way delay variation, and RTT sampling, folded
//! both into the current trial interval (reset every status-PDU send) and
//! the current sub-interval (reset every sub-interval boundary, but
//! reported one interval behind via `saved`), while never allocating per
//! datagram.
//!
//! # What
//! [`SequenceHistory`] is the fixed-size reorder/duplicate window.
//! [`ReceiverStats`] owns everything else: running counters, delay-variation
//! and RTT accumulators (both the always-live trial set and the rotated
//! sub-interval snapshot), and the rate-limited "remote stopped"/"remote
//! status loss" warning edges.
//!
//! # How
//! Grounded on the sequence-classification and delay-variation/RTT logic
//! read directly out of the reference `recv_proc` path: `seq > expected`
//! bumps loss and advances expected; a linear scan of the history buffer
//! distinguishes duplicate from reorder; a reorder match decrements the
//! *current* loss window by one (floored at zero) to compensate for the
//! earlier over-count — the documented "late arrival after the window's
//! stats were already sent can still show loss" caveat is accepted as-is.

mod history;

pub use history::SequenceHistory;

use udpst_wire::{AlertLimiter, LoadPdu, StatusPdu, SubIntervalStats};

use crate::time::{Duration64, Timestamp};

#[cfg(feature = "csv-export")]
use std::sync::Arc;

#[cfg(feature = "csv-export")]
use udpst_transport_udp::ifcounter::{InterfaceByteCounter, InterfaceByteCounts};

/// Default history window: a power of two large enough for realistic
/// reorder depths. Not specified by the retrieved reference sources; fixed
/// here as a documented Open Question resolution (see DESIGN.md).
pub const LPDU_HISTORY_SIZE: usize = 128;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SequenceOutcome {
    InOrder,
    Loss(u32),
    Reorder,
    Duplicate,
}

/// A running min/max/sum/count accumulator, used for both delay variation
/// and (separately) RTT.
#[derive(Clone, Copy, Debug, Default)]
pub struct MinMaxSumCount {
    pub min: Option<u32>,
    pub max: u32,
    pub sum: u64,
    pub count: u32,
}

impl MinMaxSumCount {
    pub fn fold(&mut self, sample_ms: u32) {
        self.min = Some(self.min.map_or(sample_ms, |m| m.min(sample_ms)));
        self.max = self.max.max(sample_ms);
        self.sum += sample_ms as u64;
        self.count += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn avg(&self) -> u32 {
        if self.count == 0 {
            0
        } else {
            (self.sum / self.count as u64) as u32
        }
    }
}

/// Per-connection receive-side state for one direction of traffic.
pub struct ReceiverStats {
    history: SequenceHistory,
    expected_seq: u32,
    seen_first: bool,

    cumulative_loss: u32,
    cumulative_ooo: u32,
    cumulative_dup: u32,
    trial_loss: u32,
    trial_ooo: u32,
    trial_dup: u32,

    trial_rx_datagrams: u32,
    trial_rx_bytes: u64,

    clock_delta_min: Option<Duration64>,
    delay_var_trial: MinMaxSumCount,
    delay_var_sub: MinMaxSumCount,
    delay_min_updated_this_trial: bool,

    rtt_minimum_ms: Option<u32>,
    rtt_sample_ms: u32,
    rtt_sub: MinMaxSumCount,

    sub_interval_seq_no: u32,
    last_saved: SubIntervalStats,
    sub_interval_rx_datagrams: u32,
    sub_interval_rx_bytes: u64,
    sub_interval_start: Timestamp,

    remote_rx_stopped: bool,
    remote_status_loss: bool,
    rx_stopped_alert: AlertLimiter,
    status_loss_alert: AlertLimiter,

    #[cfg(feature = "csv-export")]
    csv_sink: Option<csv::Writer<std::fs::File>>,
    #[cfg(feature = "csv-export")]
    intf_counter: Option<Arc<dyn InterfaceByteCounter>>,
    #[cfg(feature = "csv-export")]
    intf_prev_sample: InterfaceByteCounts,
    #[cfg(feature = "csv-export")]
    intf_prev_time: Timestamp,
}

impl ReceiverStats {
    pub fn new(history_size: usize, now: Timestamp) -> Self {
        Self {
            history: SequenceHistory::new(history_size),
            expected_seq: 0,
            seen_first: false,
            cumulative_loss: 0,
            cumulative_ooo: 0,
            cumulative_dup: 0,
            trial_loss: 0,
            trial_ooo: 0,
            trial_dup: 0,
            trial_rx_datagrams: 0,
            trial_rx_bytes: 0,
            clock_delta_min: None,
            delay_var_trial: MinMaxSumCount::default(),
            delay_var_sub: MinMaxSumCount::default(),
            delay_min_updated_this_trial: false,
            rtt_minimum_ms: None,
            rtt_sample_ms: 0,
            rtt_sub: MinMaxSumCount::default(),
            sub_interval_seq_no: 0,
            last_saved: SubIntervalStats::default(),
            sub_interval_rx_datagrams: 0,
            sub_interval_rx_bytes: 0,
            sub_interval_start: now,
            remote_rx_stopped: false,
            remote_status_loss: false,
            rx_stopped_alert: AlertLimiter::new(),
            status_loss_alert: AlertLimiter::new(),
            #[cfg(feature = "csv-export")]
            csv_sink: None,
            #[cfg(feature = "csv-export")]
            intf_counter: None,
            #[cfg(feature = "csv-export")]
            intf_prev_sample: InterfaceByteCounts::default(),
            #[cfg(feature = "csv-export")]
            intf_prev_time: now,
        }
    }

    /// Opens the optional per-datagram CSV export file (§6 "Per-datagram
    /// export") and writes its header row. `interface_counter`, when given,
    /// is sampled on every datagram to fill the `IntfMbps` column; without
    /// one that column is always written as `0`.
    #[cfg(feature = "csv-export")]
    pub fn open_csv_sink(
        &mut self,
        path: &std::path::Path,
        interface_counter: Option<Arc<dyn InterfaceByteCounter>>,
    ) -> std::io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([
            "SeqNo",
            "PayLoad",
            "SrcTxTime",
            "DstRxTime",
            "OWD",
            "IntfMbps",
            "RTTTxTime",
            "RTTRxTime",
            "RTTRespDelay",
            "RTT",
            "StatusLoss",
        ])?;
        if let Some(counter) = &interface_counter {
            self.intf_prev_sample = counter.read().unwrap_or_default();
        }
        self.csv_sink = Some(writer);
        self.intf_counter = interface_counter;
        Ok(())
    }

    #[cfg(feature = "csv-export")]
    fn sample_intf_mbps(&mut self, now: Timestamp) -> f64 {
        let Some(counter) = self.intf_counter.clone() else {
            return 0.0;
        };
        let elapsed = now.minus(self.intf_prev_time);
        if elapsed == Duration64::ZERO {
            return 0.0;
        }
        let Ok((current, delta)) = counter.sample(self.intf_prev_sample) else {
            return 0.0;
        };
        self.intf_prev_sample = current;
        self.intf_prev_time = now;
        let bits = delta.rx_bytes.saturating_add(delta.tx_bytes) as f64 * 8.0;
        bits / elapsed.as_millis_rounded() as f64 / 1_000.0
    }

    #[cfg(feature = "csv-export")]
    #[allow(clippy::too_many_arguments)]
    fn write_csv_row(
        &mut self,
        pdu: &LoadPdu,
        send_time: Timestamp,
        now: Timestamp,
        owd_ms: u32,
        intf_mbps: f64,
        rtt_tx_time: Timestamp,
        rtt_ms: Option<u32>,
    ) {
        if self.csv_sink.is_none() {
            return;
        }
        let row = [
            pdu.lpdu_seq_no.to_string(),
            pdu.udp_payload.to_string(),
            format!("{}.{:09}", send_time.secs, send_time.nanos),
            format!("{}.{:09}", now.secs, now.nanos),
            owd_ms.to_string(),
            format!("{intf_mbps:.3}"),
            format!("{}.{:09}", rtt_tx_time.secs, rtt_tx_time.nanos),
            format!("{}.{:09}", now.secs, now.nanos),
            pdu.rtt_response_delay_ms.to_string(),
            rtt_ms.map(|v| v.to_string()).unwrap_or_default(),
            pdu.spdu_seq_err.to_string(),
        ];
        let sink = self.csv_sink.as_mut().expect("checked above");
        if sink.write_record(&row).is_ok() {
            let _ = sink.flush();
        }
    }

    /// Classifies an arriving sequence number against the expected value and
    /// history window, per step 6 of §4.7.
    ///
    /// Forward/backward is decided on the wrapping distance `seq -
    /// expected_seq`, read as a signed `i32`, rather than a plain unsigned
    /// comparison: at the 2^32 wraparound a plain `seq >= expected_seq`
    /// would treat a just-wrapped `seq` near 0 as "far behind" a
    /// not-yet-wrapped `expected_seq` near `u32::MAX`, and a stale
    /// pre-wrap `seq` as "far ahead" — both backwards from what actually
    /// happened on the wire.
    fn classify_sequence(&mut self, seq: u32) -> SequenceOutcome {
        if !self.seen_first {
            self.seen_first = true;
            self.expected_seq = seq.wrapping_add(1);
            self.history.insert(seq);
            return SequenceOutcome::InOrder;
        }

        let forward_delta = seq.wrapping_sub(self.expected_seq) as i32;
        if forward_delta >= 0 {
            let lost = forward_delta as u32;
            self.expected_seq = seq.wrapping_add(1);
            self.history.insert(seq);
            if lost > 0 {
                self.cumulative_loss += lost;
                self.trial_loss += lost;
                SequenceOutcome::Loss(lost)
            } else {
                SequenceOutcome::InOrder
            }
        } else if self.history.contains(seq) {
            self.cumulative_dup += 1;
            self.trial_dup += 1;
            SequenceOutcome::Duplicate
        } else {
            self.cumulative_ooo += 1;
            self.trial_ooo += 1;
            if self.cumulative_loss > 0 {
                self.cumulative_loss -= 1;
            }
            if self.trial_loss > 0 {
                self.trial_loss -= 1;
            }
            self.history.insert(seq);
            SequenceOutcome::Reorder
        }
    }

    /// Processes one arriving Load PDU: sequence classification, byte/
    /// datagram accounting with the *declared* payload size, one-way delay
    /// variation, RTT sampling, and the rising-edge remote-state warnings.
    /// Returns `true` if an alert should be logged for a rising
    /// rx-stopped/status-loss edge (caller decides the log level/message).
    pub fn on_load_pdu(&mut self, pdu: &LoadPdu, now: Timestamp) -> LoadPduOutcome {
        let sequence = self.classify_sequence(pdu.lpdu_seq_no);

        self.trial_rx_datagrams += 1;
        self.trial_rx_bytes += pdu.udp_payload as u64;
        self.sub_interval_rx_datagrams += 1;
        self.sub_interval_rx_bytes += pdu.udp_payload as u64;

        let send_time = Timestamp::new(pdu.lpdu_time_sec, pdu.lpdu_time_nsec);
        let delta = now.minus(send_time);
        let clock_delta_min = *self.clock_delta_min.get_or_insert(delta);
        let delay_var_sample = (delta - clock_delta_min).as_millis_rounded() as u32;
        self.delay_var_trial.fold(delay_var_sample);
        self.delay_var_sub.fold(delay_var_sample);
        self.delay_min_updated_this_trial = delta <= clock_delta_min;

        let status_send_time = Timestamp::new(pdu.spdu_time_sec, pdu.spdu_time_nsec);
        let rtt_ms = if status_send_time.is_set() {
            let raw = now.minus(status_send_time).as_millis_rounded() as i64 - pdu.rtt_response_delay_ms as i64;
            Some(raw.max(0) as u32)
        } else {
            None
        };
        if let Some(rtt) = rtt_ms {
            self.rtt_minimum_ms = Some(self.rtt_minimum_ms.map_or(rtt, |m| m.min(rtt)));
            self.rtt_sample_ms = rtt;
            self.rtt_sub.fold(rtt);
        }

        #[cfg(feature = "csv-export")]
        if self.csv_sink.is_some() {
            let intf_mbps = self.sample_intf_mbps(now);
            self.write_csv_row(pdu, send_time, now, delay_var_sample, intf_mbps, status_send_time, rtt_ms);
        }

        let mut rising_rx_stopped = false;
        if pdu.rx_stopped && !self.remote_rx_stopped {
            rising_rx_stopped = self.rx_stopped_alert.should_emit();
        }
        self.remote_rx_stopped = pdu.rx_stopped;

        let mut rising_status_loss = false;
        let status_loss_now = pdu.spdu_seq_err > 0;
        if status_loss_now && !self.remote_status_loss {
            rising_status_loss = self.status_loss_alert.should_emit();
        }
        self.remote_status_loss = status_loss_now;

        LoadPduOutcome { sequence, rising_rx_stopped, rising_status_loss }
    }

    /// Snapshots trial counters into a Status PDU skeleton (caller fills in
    /// `test_action`/`rx_stopped`/`spdu_seq_no`/`sending_rate`/send-time) and
    /// zeroes the trial-interval counters, but never the cumulative minima.
    pub fn snapshot_and_reset_trial(&mut self) -> TrialSnapshot {
        let snapshot = TrialSnapshot {
            seq_err_loss: self.trial_loss,
            seq_err_ooo: self.trial_ooo,
            seq_err_dup: self.trial_dup,
            clock_delta_min_ms: self.clock_delta_min.map(|d| d.as_millis_rounded() as i32).unwrap_or(0),
            delay_var_min_ms: self.delay_var_trial.min.unwrap_or(0),
            delay_var_max_ms: self.delay_var_trial.max,
            delay_var_sum_ms: self.delay_var_trial.sum,
            delay_var_cnt: self.delay_var_trial.count,
            rtt_minimum_ms: self.rtt_minimum_ms.unwrap_or(0),
            rtt_sample_ms: self.rtt_sample_ms,
            delay_min_updated: self.delay_min_updated_this_trial,
            trial_rx_datagrams: self.trial_rx_datagrams,
            trial_rx_bytes: self.trial_rx_bytes,
        };

        self.trial_loss = 0;
        self.trial_ooo = 0;
        self.trial_dup = 0;
        self.trial_rx_datagrams = 0;
        self.trial_rx_bytes = 0;
        self.delay_var_trial.reset();
        self.delay_min_updated_this_trial = false;

        snapshot
    }

    /// Rotates active sub-interval counters into `last_saved` and bumps the
    /// sub-interval sequence number. Called on a clock-driven boundary with
    /// granularity equal to the trial interval plus a half-trial slack.
    pub fn rotate_sub_interval(&mut self, now: Timestamp) {
        self.last_saved = SubIntervalStats {
            rx_datagrams: self.sub_interval_rx_datagrams,
            rx_bytes: self.sub_interval_rx_bytes,
            delay_var_min_ms: self.delay_var_sub.min.unwrap_or(0),
            delay_var_max_ms: self.delay_var_sub.max,
            delay_var_avg_ms: self.delay_var_sub.avg(),
            rtt_min_ms: self.rtt_sub.min.unwrap_or(0),
            rtt_max_ms: self.rtt_sub.max,
            seq_err_loss: self.cumulative_loss,
            seq_err_ooo: self.cumulative_ooo,
            seq_err_dup: self.cumulative_dup,
            duration_ms: now.minus(self.sub_interval_start).as_millis_rounded() as u32,
        };
        self.sub_interval_seq_no += 1;
        self.sub_interval_rx_datagrams = 0;
        self.sub_interval_rx_bytes = 0;
        self.delay_var_sub.reset();
        self.rtt_sub.reset();
        self.sub_interval_start = now;
    }

    pub fn last_saved(&self) -> &SubIntervalStats {
        &self.last_saved
    }

    pub fn sub_interval_seq_no(&self) -> u32 {
        self.sub_interval_seq_no
    }

    pub fn cumulative_seq_errors(&self) -> (u32, u32, u32) {
        (self.cumulative_loss, self.cumulative_ooo, self.cumulative_dup)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LoadPduOutcome {
    pub sequence: SequenceOutcome,
    pub rising_rx_stopped: bool,
    pub rising_status_loss: bool,
}

/// Trial-interval values ready to be written into an outgoing [`StatusPdu`].
#[derive(Clone, Copy, Debug)]
pub struct TrialSnapshot {
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
    pub trial_rx_datagrams: u32,
    pub trial_rx_bytes: u64,
}

impl TrialSnapshot {
    /// Applies this snapshot's fields onto a caller-constructed
    /// `StatusPdu`, leaving the identity/action fields the caller already
    /// set untouched.
    pub fn apply(&self, pdu: &mut StatusPdu) {
        pdu.seq_err_loss = self.seq_err_loss;
        pdu.seq_err_ooo = self.seq_err_ooo;
        pdu.seq_err_dup = self.seq_err_dup;
        pdu.clock_delta_min_ms = self.clock_delta_min_ms;
        pdu.delay_var_min_ms = self.delay_var_min_ms;
        pdu.delay_var_max_ms = self.delay_var_max_ms;
        pdu.delay_var_sum_ms = self.delay_var_sum_ms;
        pdu.delay_var_cnt = self.delay_var_cnt;
        pdu.rtt_minimum_ms = self.rtt_minimum_ms;
        pdu.rtt_sample_ms = self.rtt_sample_ms;
        pdu.delay_min_updated = self.delay_min_updated;
        pdu.trial_rx_datagrams = self.trial_rx_datagrams;
        pdu.trial_rx_bytes = self.trial_rx_bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdu(seq: u32) -> LoadPdu {
        LoadPdu {
            test_action: 0,
            rx_stopped: false,
            lpdu_seq_no: seq,
            udp_payload: 1222,
            spdu_seq_err: 0,
            spdu_time_sec: 0,
            spdu_time_nsec: 0,
            lpdu_time_sec: 100,
            lpdu_time_nsec: 0,
            rtt_response_delay_ms: 0,
        }
    }

    #[test]
    fn in_order_sequence_does_not_affect_loss() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        for seq in 0..5 {
            stats.on_load_pdu(&pdu(seq), Timestamp::new(100, 0));
        }
        assert_eq!(stats.cumulative_seq_errors(), (0, 0, 0));
    }

    #[test]
    fn gap_then_reorder_decrements_loss_window() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(0), Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(2), Timestamp::new(100, 0)); // gap: seq 1 lost
        assert_eq!(stats.cumulative_seq_errors().0, 1);
        stats.on_load_pdu(&pdu(1), Timestamp::new(100, 0)); // late arrival: reorder
        assert_eq!(stats.cumulative_seq_errors(), (0, 1, 0));
    }

    #[test]
    fn repeated_sequence_counts_as_duplicate() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(0), Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(1), Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(0), Timestamp::new(100, 0));
        assert_eq!(stats.cumulative_seq_errors(), (0, 0, 1));
    }

    #[test]
    fn trial_reset_clears_counters_but_not_cumulative_minima() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(0), Timestamp::new(100, 0));
        let snap = stats.snapshot_and_reset_trial();
        assert_eq!(snap.trial_rx_datagrams, 1);
        assert_eq!(stats.trial_rx_datagrams, 0);
        // clock_delta_min must survive a trial reset.
        stats.on_load_pdu(&pdu(1), Timestamp::new(100, 0));
        assert!(stats.clock_delta_min.is_some());
    }

    #[test]
    fn rx_datagrams_increase_by_exactly_one_per_load_pdu() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        let before = stats.sub_interval_rx_datagrams;
        stats.on_load_pdu(&pdu(0), Timestamp::new(100, 0));
        assert_eq!(stats.sub_interval_rx_datagrams, before + 1);
    }

    #[test]
    fn rx_bytes_increase_by_declared_payload_size() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(0), Timestamp::new(100, 0));
        assert_eq!(stats.sub_interval_rx_bytes, 1222);
    }

    #[test]
    fn sequence_number_wraps_at_2_32_without_panicking() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(u32::MAX), Timestamp::new(100, 0));
        assert_eq!(stats.expected_seq, 0);
        let outcome = stats.on_load_pdu(&pdu(0), Timestamp::new(100, 0));
        assert_eq!(outcome.sequence, SequenceOutcome::InOrder);
        assert_eq!(stats.cumulative_seq_errors(), (0, 0, 0));
    }

    #[test]
    fn loss_spanning_the_wrap_boundary_counts_the_wrapped_span() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        // Accept u32::MAX - 1 (expected becomes u32::MAX), then skip
        // u32::MAX, 0, 1, arriving directly at 2: three datagrams lost
        // across the wrap.
        stats.on_load_pdu(&pdu(u32::MAX - 1), Timestamp::new(100, 0));
        let outcome = stats.on_load_pdu(&pdu(2), Timestamp::new(100, 0));
        assert_eq!(outcome.sequence, SequenceOutcome::Loss(3));
        assert_eq!(stats.cumulative_seq_errors(), (3, 0, 0));
    }

    #[test]
    fn a_stale_pre_wrap_sequence_is_not_mistaken_for_a_forward_jump() {
        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(u32::MAX), Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(0), Timestamp::new(100, 0));
        stats.on_load_pdu(&pdu(1), Timestamp::new(100, 0));
        // A very old, never-seen sequence number from well before the wrap
        // arrives late: it must be classified as reorder, not as billions
        // of datagrams of fresh loss.
        let outcome = stats.on_load_pdu(&pdu(u32::MAX - 5), Timestamp::new(100, 0));
        assert_eq!(outcome.sequence, SequenceOutcome::Reorder);
        assert_eq!(stats.cumulative_seq_errors(), (0, 1, 0));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn reorder_within_history_window_never_inflates_loss(
            start in 0u32..=u32::MAX,
            gap in 1u32..16,
        ) {
            // seq = start, then start+gap (a "gap" datagrams lost), then the
            // late arrival of every sequence number skipped by the gap, in
            // reverse order. Final loss must be back down to zero and ooo
            // must equal the gap size, regardless of where in the u32 space
            // `start` falls (exercises the wraparound boundary for free
            // when `start` lands near `u32::MAX`).
            let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
            stats.on_load_pdu(&pdu(start), Timestamp::new(100, 0));
            stats.on_load_pdu(&pdu(start.wrapping_add(gap)), Timestamp::new(100, 0));
            prop_assert_eq!(stats.cumulative_seq_errors().0, gap - 1);
            for missed in 1..gap {
                stats.on_load_pdu(&pdu(start.wrapping_add(missed)), Timestamp::new(100, 0));
            }
            let (loss, ooo, dup) = stats.cumulative_seq_errors();
            prop_assert_eq!(loss, 0);
            prop_assert_eq!(ooo, gap - 1);
            prop_assert_eq!(dup, 0);
        }
    }

    #[cfg(feature = "csv-export")]
    #[test]
    fn per_datagram_csv_sink_writes_one_row_per_load_pdu_with_header() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("udpst-receiver-csv-test-{:?}.csv", std::thread::current().id()));

        let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, Timestamp::new(100, 0));
        stats.open_csv_sink(&path, None).unwrap();
        stats.on_load_pdu(&pdu(0), Timestamp::new(100, 1_000_000));
        stats.on_load_pdu(&pdu(1), Timestamp::new(100, 2_000_000));
        drop(stats);

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "SeqNo,PayLoad,SrcTxTime,DstRxTime,OWD,IntfMbps,RTTTxTime,RTTRxTime,RTTRespDelay,RTT,StatusLoss"
        );
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("0,1222,"));
        assert!(rows[1].starts_with("1,1222,"));
    }
}
