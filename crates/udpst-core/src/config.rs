//! Configuration and parameter validation.
//!
//! # Why
//! Clamping and tie-break rules (§4.5) are pure functions of the requested
//! values and the server's own maxima; keeping them here, independent of the
//! socket/PDU plumbing, lets the control state machine call one function
//! instead of re-deriving the rules inline, and lets `udpst-cli` validate a
//! parsed command line against the same bounds the server will eventually
//! clamp to.
//!
//! # What
//! [`TestParameters`] is the negotiated, already-clamped parameter set a
//! connection runs with. [`TestParameters::clamp`] applies §B.1's min/max
//! table and the tie-break rules from §4.5. [`RateAlgorithm`] and
//! [`Direction`] are small enums shared by the control and rate-adjustment
//! modules.

use serde::{Deserialize, Serialize};

pub const DEF_LOW_THRESH_MS: u32 = 30;
pub const MIN_LOW_THRESH_MS: u32 = 1;
pub const MAX_LOW_THRESH_MS: u32 = 10_000;

pub const DEF_UPPER_THRESH_MS: u32 = 90;
pub const MIN_UPPER_THRESH_MS: u32 = 1;
pub const MAX_UPPER_THRESH_MS: u32 = 10_000;

pub const DEF_TEST_INTERVAL_S: u16 = 10;
pub const MIN_TEST_INTERVAL_S: u16 = 5;
pub const MAX_TEST_INTERVAL_S: u16 = 3600;

pub const DEF_SUB_INTERVAL_PERIOD_S: u8 = 1;
pub const MIN_SUB_INTERVAL_PERIOD_S: u8 = 1;
pub const MAX_SUB_INTERVAL_PERIOD_S: u8 = 10;

pub const DEF_TRIAL_INTERVAL_MS: u16 = 50;
pub const MIN_TRIAL_INTERVAL_MS: u16 = 5;
pub const MAX_TRIAL_INTERVAL_MS: u16 = 250;

pub const DEF_SLOW_ADJ_THRESHOLD: u16 = 2;
pub const MIN_SLOW_ADJ_THRESHOLD: u16 = 1;
pub const MAX_SLOW_ADJ_THRESHOLD: u16 = 65_535;

pub const DEF_HIGH_SPEED_DELTA: u8 = 10;
pub const MIN_HIGH_SPEED_DELTA: u8 = 1;
pub const MAX_HIGH_SPEED_DELTA: u8 = 255;

pub const DEF_SEQ_ERROR_THRESHOLD: u16 = 0;
pub const MAX_SEQ_ERROR_THRESHOLD: u16 = 65_535;

pub const DEF_SR_INDEX_CONF: u16 = u16::MAX;

pub const DEF_CONTROL_PORT: u16 = 25_000;
pub const MAX_CONNECTIONS: usize = 128;
pub const WARNING_MSG_LIMIT: u32 = 50;
pub const NO_TRAFFIC_WARNING_S: u64 = 1;
pub const NO_TRAFFIC_TIMEOUT_S: u64 = NO_TRAFFIC_WARNING_S + 4;
pub const AUTH_TIME_WINDOW_S: i64 = 150;
pub const HIGH_SPEED_DELTA_BACKUP_MULTIPLIER: u32 = 3;
pub const ALGO_C_RETRY_THRESH_STEP: u32 = 4;
pub const DEF_SOCKET_BUFFER_BYTES: usize = 1_024_000;
pub const MAX_SOCKET_BUFFER_BYTES: usize = 16_777_216;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    Upstream,
    Downstream,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RateAlgorithm {
    B,
    C,
}

/// One connection's negotiated, already-clamped test parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestParameters {
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
    pub algorithm: RateAlgorithm,
    pub one_way_delay: bool,
    pub ignore_oo_dup: bool,
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            low_thresh_ms: DEF_LOW_THRESH_MS,
            upper_thresh_ms: DEF_UPPER_THRESH_MS,
            trial_interval_ms: DEF_TRIAL_INTERVAL_MS,
            test_interval_s: DEF_TEST_INTERVAL_S,
            sub_interval_period_s: DEF_SUB_INTERVAL_PERIOD_S,
            ip_tos_byte: 0,
            sr_index_conf: DEF_SR_INDEX_CONF,
            sr_index_is_start: false,
            random_payload: false,
            high_speed_delta: DEF_HIGH_SPEED_DELTA,
            slow_adjust_threshold: DEF_SLOW_ADJ_THRESHOLD,
            seq_error_threshold: DEF_SEQ_ERROR_THRESHOLD,
            algorithm: RateAlgorithm::B,
            one_way_delay: false,
            ignore_oo_dup: false,
        }
    }
}

impl TestParameters {
    /// Clamps every field to its documented [min, max] and applies the
    /// tie-break rules from §4.5:
    /// - low > upper (as a pair) resets both to defaults.
    /// - sub-interval period > test interval resets both to defaults.
    /// - the one-way/ignore flags, being strict booleans, silently collapse
    ///   any already-validated non-bool input back to `false` upstream of
    ///   this function (the wire codec reads them as single bits, so no
    ///   further action is needed here).
    pub fn clamp(mut self, max_sr_index: u16) -> Self {
        self.low_thresh_ms = self.low_thresh_ms.clamp(MIN_LOW_THRESH_MS, MAX_LOW_THRESH_MS);
        self.upper_thresh_ms = self.upper_thresh_ms.clamp(MIN_UPPER_THRESH_MS, MAX_UPPER_THRESH_MS);
        if self.low_thresh_ms > self.upper_thresh_ms {
            self.low_thresh_ms = DEF_LOW_THRESH_MS;
            self.upper_thresh_ms = DEF_UPPER_THRESH_MS;
        }

        self.trial_interval_ms = self.trial_interval_ms.clamp(MIN_TRIAL_INTERVAL_MS, MAX_TRIAL_INTERVAL_MS);
        self.test_interval_s = self.test_interval_s.clamp(MIN_TEST_INTERVAL_S, MAX_TEST_INTERVAL_S);
        self.sub_interval_period_s =
            self.sub_interval_period_s.clamp(MIN_SUB_INTERVAL_PERIOD_S, MAX_SUB_INTERVAL_PERIOD_S);
        if self.sub_interval_period_s as u16 > self.test_interval_s {
            self.sub_interval_period_s = DEF_SUB_INTERVAL_PERIOD_S;
            self.test_interval_s = DEF_TEST_INTERVAL_S;
        }

        self.high_speed_delta = self.high_speed_delta.clamp(MIN_HIGH_SPEED_DELTA, MAX_HIGH_SPEED_DELTA);
        self.slow_adjust_threshold =
            self.slow_adjust_threshold.clamp(MIN_SLOW_ADJ_THRESHOLD, MAX_SLOW_ADJ_THRESHOLD);
        self.seq_error_threshold = self.seq_error_threshold.min(MAX_SEQ_ERROR_THRESHOLD);

        if self.sr_index_conf != DEF_SR_INDEX_CONF {
            self.sr_index_conf = self.sr_index_conf.min(max_sr_index);
        }

        self
    }

    /// Number of planned sub-intervals, used to size the bimodal reporting
    /// split and pre-allocate per-sub-interval accumulators.
    pub fn planned_sub_intervals(&self) -> u32 {
        (self.test_interval_s as u32) / (self.sub_interval_period_s as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_above_upper_resets_both_to_defaults() {
        let params = TestParameters { low_thresh_ms: 200, upper_thresh_ms: 100, ..TestParameters::default() };
        let clamped = params.clamp(1090);
        assert_eq!(clamped.low_thresh_ms, DEF_LOW_THRESH_MS);
        assert_eq!(clamped.upper_thresh_ms, DEF_UPPER_THRESH_MS);
    }

    #[test]
    fn sub_interval_above_test_interval_resets_both() {
        let params =
            TestParameters { sub_interval_period_s: 10, test_interval_s: 5, ..TestParameters::default() };
        let clamped = params.clamp(1090);
        assert_eq!(clamped.sub_interval_period_s, DEF_SUB_INTERVAL_PERIOD_S);
        assert_eq!(clamped.test_interval_s, DEF_TEST_INTERVAL_S);
    }

    #[test]
    fn out_of_range_fields_are_clamped_not_reset() {
        let params = TestParameters { high_speed_delta: 0, ..TestParameters::default() };
        let clamped = params.clamp(1090);
        assert_eq!(clamped.high_speed_delta, MIN_HIGH_SPEED_DELTA);
    }

    #[test]
    fn sentinel_sr_index_conf_is_left_untouched() {
        let params = TestParameters::default();
        let clamped = params.clamp(50);
        assert_eq!(clamped.sr_index_conf, DEF_SR_INDEX_CONF);
    }

    #[test]
    fn explicit_sr_index_conf_is_clamped_to_table_maximum() {
        let params = TestParameters { sr_index_conf: 5000, ..TestParameters::default() };
        let clamped = params.clamp(1090);
        assert_eq!(clamped.sr_index_conf, 1090);
    }

    #[test]
    fn planned_sub_intervals_divides_test_by_sub_interval() {
        let params = TestParameters { test_interval_s: 10, sub_interval_period_s: 2, ..TestParameters::default() };
        assert_eq!(params.planned_sub_intervals(), 5);
    }
}
