//! Rate-Adjustment Engine (C8).
//!
//! # Why
//! The sender needs a single next-index decision per trial interval, driven
//! by whatever loss/delay the receiver last reported, without either
//! oscillating wildly at high speed or crawling forever at low speed.
//! Algorithm B is the conservative, mostly-linear search; Algorithm C trades
//! some stability for a much faster ramp by doubling every other good cycle
//! below the high-speed threshold.
//!
//! # What
//! [`RateAdjuster`] holds the small amount of state both algorithms need
//! across cycles (`slow_adj_count`, Algorithm C's toggle and retry counter)
//! and exposes [`RateAdjuster::next_index`], grounded directly on
//! `adjust_sending_rate` in the reference implementation. [`RateLimiter`]
//! implements the optional bandwidth-ceiling cap from the same function's
//! `#ifdef RATE_LIMITING` block.
//!
//! # How
//! Both algorithms are expressed as plain index arithmetic over a
//! `RateTable` the caller already owns; this module never constructs or
//! mutates the table itself.

use udpst_rate_table::RateTable;

use crate::config::{RateAlgorithm, ALGO_C_RETRY_THRESH_STEP, HIGH_SPEED_DELTA_BACKUP_MULTIPLIER};

/// Per-cycle feedback the rate-adjustment engine consumes.
#[derive(Clone, Copy, Debug)]
pub struct Feedback {
    /// Loss, plus (unless `ignore_oo_dup`) reorder and duplicate counts,
    /// accumulated over the trial interval just reported.
    pub seq_error_total: u32,
    /// Latest RTT sample (RTT mode) or average one-way delay variation over
    /// the trial interval (one-way mode), in milliseconds. `None` means no
    /// data was available yet, in which case the low threshold itself is
    /// used so the first cycle always reads as "good".
    pub delay_ms: Option<u32>,
}

/// Static, per-connection configuration the engine needs on every cycle.
#[derive(Clone, Copy, Debug)]
pub struct Thresholds {
    pub low_thresh_ms: u32,
    pub upper_thresh_ms: u32,
    pub seq_error_threshold: u32,
    pub slow_adjust_threshold: u32,
    pub high_speed_delta: u32,
    pub high_speed_threshold: usize,
}

/// Mutable per-connection rate-adjustment state, carried across cycles.
#[derive(Clone, Copy, Debug, Default)]
pub struct RateAdjuster {
    pub sr_index: usize,
    slow_adj_count: u32,
    algo_c_update_toggle: bool,
    algo_c_retry_count: u32,
    algo_c_retry_threshold: u32,
}

impl RateAdjuster {
    pub fn new(initial_index: usize) -> Self {
        Self { sr_index: initial_index, ..Default::default() }
    }

    /// Computes and applies the next index, honoring a static override
    /// (`sr_index_conf` pinned by configuration) ahead of either search
    /// algorithm, exactly as `adjust_sending_rate` checks
    /// `srIndexConf != DEF_SRINDEX_CONF && !srIndexIsStart` first.
    pub fn next_index(
        &mut self,
        algorithm: RateAlgorithm,
        feedback: Feedback,
        thresholds: Thresholds,
        max_index: usize,
        static_override: Option<usize>,
    ) -> usize {
        if let Some(fixed) = static_override {
            self.sr_index = fixed.min(max_index);
            return self.sr_index;
        }

        let delay_ms = feedback.delay_ms.unwrap_or(thresholds.low_thresh_ms);
        let good = feedback.seq_error_total <= thresholds.seq_error_threshold && delay_ms < thresholds.low_thresh_ms;
        let bad = feedback.seq_error_total > thresholds.seq_error_threshold || delay_ms > thresholds.upper_thresh_ms;

        match algorithm {
            RateAlgorithm::B => self.step_algorithm_b(good, bad, thresholds, max_index),
            RateAlgorithm::C => self.step_algorithm_c(good, bad, thresholds, max_index),
        }
        self.sr_index
    }

    fn step_algorithm_b(&mut self, good: bool, bad: bool, t: Thresholds, max_index: usize) {
        if good {
            if self.sr_index < t.high_speed_threshold && self.slow_adj_count < t.slow_adjust_threshold {
                self.sr_index = (self.sr_index + t.high_speed_delta as usize).min(t.high_speed_threshold);
                self.slow_adj_count = 0;
            } else {
                self.sr_index = (self.sr_index + 1).min(max_index);
            }
        } else if bad {
            self.slow_adj_count += 1;
            if self.sr_index < t.high_speed_threshold && self.slow_adj_count == t.slow_adjust_threshold {
                let backoff = t.high_speed_delta as usize * HIGH_SPEED_DELTA_BACKUP_MULTIPLIER as usize;
                self.sr_index = self.sr_index.saturating_sub(backoff);
            } else {
                self.sr_index = self.sr_index.saturating_sub(1);
            }
        }
    }

    fn step_algorithm_c(&mut self, good: bool, bad: bool, t: Thresholds, max_index: usize) {
        if self.algo_c_retry_threshold == 0 {
            self.algo_c_retry_threshold = ALGO_C_RETRY_THRESH_STEP;
        }

        if good {
            if self.sr_index < t.high_speed_threshold && self.slow_adj_count < t.slow_adjust_threshold {
                if self.sr_index * 2 > t.high_speed_threshold {
                    self.sr_index = t.high_speed_threshold;
                } else {
                    if self.sr_index == 0 {
                        self.sr_index = 1;
                    }
                    if self.algo_c_update_toggle {
                        self.sr_index *= 2;
                        self.algo_c_update_toggle = false;
                    } else {
                        self.algo_c_update_toggle = true;
                    }
                }
                self.slow_adj_count = 0;
            } else {
                self.sr_index = (self.sr_index + 1).min(max_index);
                self.algo_c_retry_count += 1;
                if self.algo_c_retry_count >= self.algo_c_retry_threshold {
                    self.slow_adj_count = 0;
                    self.algo_c_retry_count = 0;
                    self.algo_c_retry_threshold += ALGO_C_RETRY_THRESH_STEP;
                }
            }
        } else if bad {
            self.slow_adj_count += 1;
            if self.sr_index < t.high_speed_threshold {
                if self.slow_adj_count == t.slow_adjust_threshold {
                    let backoff = t.high_speed_delta as usize * HIGH_SPEED_DELTA_BACKUP_MULTIPLIER as usize;
                    self.sr_index = self.sr_index.saturating_sub(backoff);
                } else {
                    self.sr_index = self.sr_index.saturating_sub(1);
                }
            } else {
                self.sr_index = self.sr_index.saturating_sub(1);
                self.algo_c_retry_count += 1;
                if self.algo_c_retry_count >= self.algo_c_retry_threshold {
                    self.slow_adj_count = 0;
                    self.algo_c_retry_count = 0;
                    self.algo_c_retry_threshold += ALGO_C_RETRY_THRESH_STEP;
                }
            }
        }
    }
}

/// Optional per-connection bandwidth ceiling, applied after the search
/// algorithm picks an index: the index is pulled down (never pushed up) to
/// the first row whose simplified aggregate rate meets or exceeds the
/// configured ceiling.
#[derive(Clone, Copy, Debug)]
pub struct RateLimiter {
    max_mbps: u64,
}

impl RateLimiter {
    pub fn new(max_mbps: u64) -> Self {
        Self { max_mbps }
    }

    pub fn cap(&self, table: &RateTable, candidate_index: usize) -> usize {
        for (i, row) in table.rows().iter().enumerate() {
            if row.aggregate_mbps_simplified() >= self.max_mbps {
                return candidate_index.min(i);
            }
        }
        candidate_index
    }
}
