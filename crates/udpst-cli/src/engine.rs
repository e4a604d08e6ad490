//! The per-connection transmitter/receiver async loops (C6/C7/C8 driven end
//! to end over a live socket).
//!
//! # Why
//! `udpst-core` deliberately keeps its event loop (`loop_::EventLoop`)
//! socket-free and single-threaded so the control/rate-adjustment logic can
//! be exercised without a network. A real binary still needs *something*
//! driving a live `UdpEndpoint`; rather than reimplement that cooperative
//! scheduler here, this module gives every test connection its own tokio
//! task. That is a deliberate simplification over the reference
//! implementation's one-thread-does-everything dispatch loop, recorded as
//! an Open Question resolution in `DESIGN.md`: with `tokio::net::UdpSocket`
//! already non-blocking and `select!`-friendly, one task per connection
//! reads as the idiomatic async-Rust shape, and `udpst-core`'s scheduler
//! stays available for an embedded or no-std-adjacent caller that needs it.
//!
//! # What
//! [`run_transmitter`] owns the sending side of one test connection: it
//! paces two independent burst timers off the active sending-rate row,
//! feeds every inbound Status PDU to a [`RateAdjuster`], and runs the stop
//! handshake. [`run_receiver`] owns the receiving side: it classifies
//! inbound Load PDUs through [`ReceiverStats`], rotates sub-intervals, and
//! emits a Status PDU on every trial-interval boundary.
//!
//! # How
//! Both loops are a single `tokio::select!` over "the socket is readable"
//! and "the next scheduled timer fired", matching the reference
//! implementation's `select()`-over-one-fd-plus-timers shape translated to
//! tokio's primitives.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tracing::{debug, trace, warn};
use udpst_core::config::{RateAlgorithm, TestParameters};
use udpst_core::control::StopHandshake;
use udpst_core::loadgen::{build_burst, BurstContext, BurstPlan, Transmitter};
use udpst_core::ratecontrol::{Feedback, RateAdjuster, RateLimiter, Thresholds};
use udpst_core::receiver::{ReceiverStats, LPDU_HISTORY_SIZE};
use udpst_core::time::{Clock, Duration64, Timestamp};
use udpst_rate_table::RateTable;
use udpst_transport_udp::UdpEndpoint;
use udpst_wire::{decode_any, AnyPdu, LoadPdu, StatusPdu, TestAction};

/// Static per-connection configuration a transmitter loop needs beyond the
/// live socket and rate table.
#[derive(Clone)]
pub struct TransmitterConfig {
    pub params: TestParameters,
    pub initial_index: usize,
    pub max_index: usize,
    pub high_speed_threshold: usize,
    pub ipv6: bool,
    pub rate_limit_mbps: Option<u64>,
    pub random_content: bool,
}

/// Final counters a transmitter loop reports once the connection ends.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransmitterSummary {
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub final_sr_index: usize,
}

/// Runs the sending side of one test connection until `stop` fires or the
/// peer's stop handshake completes. `endpoint` must already be connected to
/// its single remote peer.
pub async fn run_transmitter(
    endpoint: Arc<UdpEndpoint>,
    table: Arc<RateTable>,
    clock: Arc<dyn Clock>,
    cfg: TransmitterConfig,
    mut stop: watch::Receiver<bool>,
) -> TransmitterSummary {
    let static_override = if cfg.params.sr_index_conf != udpst_core::config::DEF_SR_INDEX_CONF
        && !cfg.params.sr_index_is_start
    {
        Some(cfg.params.sr_index_conf as usize)
    } else {
        None
    };

    let thresholds = Thresholds {
        low_thresh_ms: cfg.params.low_thresh_ms,
        upper_thresh_ms: cfg.params.upper_thresh_ms,
        seq_error_threshold: cfg.params.seq_error_threshold as u32,
        slow_adjust_threshold: cfg.params.slow_adjust_threshold as u32,
        high_speed_delta: cfg.params.high_speed_delta as u32,
        high_speed_threshold: cfg.high_speed_threshold,
    };
    let rate_limiter = cfg.rate_limit_mbps.map(RateLimiter::new);
    let mut adjuster = RateAdjuster::new(cfg.initial_index);
    let algorithm = cfg.params.algorithm;

    let mut rng = StdRng::from_entropy();
    let mut summary = TransmitterSummary { final_sr_index: cfg.initial_index, ..Default::default() };

    let mut local_action = TestAction::Test;
    let mut next_due1 = clock.now();
    let mut next_due2 = clock.now();
    let mut next_seq_no = 0u32;
    let mut last_spdu_seq_err = 0u32;
    let mut last_status_send_time = Timestamp::ZERO;
    let mut rtt_response_delay_ms = 0u32;
    let mut recv_buf = vec![0u8; 65536];

    loop {
        if *stop.borrow() && local_action == TestAction::Test {
            local_action = TestAction::Stop1;
        }

        let row = *table.row(adjuster.sr_index).unwrap_or_else(|| table.row(0).unwrap());
        let now = clock.now();
        let sleep_until = |next: Timestamp, interval_usec: u32| -> Duration {
            if interval_usec == 0 {
                Duration::from_secs(3600)
            } else if next <= now {
                Duration::ZERO
            } else {
                next.minus(now).as_duration()
            }
        };
        let wait1 = sleep_until(next_due1, row.tx_interval1);
        let wait2 = sleep_until(next_due2, row.tx_interval2);

        tokio::select! {
            result = endpoint.readable() => {
                if result.is_err() {
                    continue;
                }
                match endpoint.try_recv(&mut recv_buf) {
                    Ok(n) => {
                        if let Ok(AnyPdu::Status(status)) = decode_any(&recv_buf[..n]) {
                            summary.final_sr_index = adjuster.sr_index;
                            last_spdu_seq_err = status.seq_err_loss + status.seq_err_ooo + status.seq_err_dup;
                            last_status_send_time = Timestamp::new(status.send_time_sec, status.send_time_nsec);
                            rtt_response_delay_ms = 0;

                            if status.test_action().map(|a| a != TestAction::Test).unwrap_or(false) {
                                local_action = StopHandshake::advance(local_action, status.test_action().unwrap());
                            }

                            if static_override.is_none() {
                                let feedback = Feedback {
                                    seq_error_total: last_spdu_seq_err,
                                    delay_ms: Some(if cfg.params.one_way_delay {
                                        status.delay_var_max_ms
                                    } else {
                                        status.rtt_sample_ms
                                    }),
                                };
                                let mut idx = adjuster.next_index(
                                    algorithm,
                                    feedback,
                                    thresholds,
                                    cfg.max_index,
                                    static_override,
                                );
                                if let Some(limiter) = &rate_limiter {
                                    idx = limiter.cap(&table, idx);
                                    adjuster.sr_index = idx;
                                }
                            }

                            if local_action != TestAction::Test
                                && StopHandshake::originator_should_end(local_action, status.test_action().unwrap_or(TestAction::Test))
                            {
                                debug!("peer acknowledged stop, ending transmitter loop");
                                break;
                            }
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => warn!(error = %e, "transient socket error on transmitter receive"),
                }
            }
            _ = tokio::time::sleep(wait1), if row.tx_interval1 > 0 => {
                let ctx = BurstContext {
                    transmitter: Transmitter::One,
                    ipv6: cfg.ipv6,
                    stopping: local_action != TestAction::Test,
                    test_action: local_action,
                    next_seq_no,
                    last_spdu_seq_err,
                    last_status_send_time,
                    now: clock.now(),
                    rtt_response_delay_ms,
                };
                let plan = BurstPlan::resolve(&row, &ctx);
                let datagrams = build_burst(&plan, &ctx, &mut rng, cfg.random_content);
                next_seq_no = next_seq_no.wrapping_add(datagrams.len() as u32);
                for dg in &datagrams {
                    if let Ok(n) = endpoint.try_send(dg) {
                        summary.datagrams_sent += 1;
                        summary.bytes_sent += n as u64;
                    }
                }
                next_due1 = clock.now().plus(Duration64::from_micros(row.tx_interval1 as u64));
            }
            _ = tokio::time::sleep(wait2), if row.tx_interval2 > 0 => {
                let ctx = BurstContext {
                    transmitter: Transmitter::Two,
                    ipv6: cfg.ipv6,
                    stopping: local_action != TestAction::Test,
                    test_action: local_action,
                    next_seq_no,
                    last_spdu_seq_err,
                    last_status_send_time,
                    now: clock.now(),
                    rtt_response_delay_ms,
                };
                let plan = BurstPlan::resolve(&row, &ctx);
                let datagrams = build_burst(&plan, &ctx, &mut rng, cfg.random_content);
                next_seq_no = next_seq_no.wrapping_add(datagrams.len() as u32);
                for dg in &datagrams {
                    if let Ok(n) = endpoint.try_send(dg) {
                        summary.datagrams_sent += 1;
                        summary.bytes_sent += n as u64;
                    }
                }
                next_due2 = clock.now().plus(Duration64::from_micros(row.tx_interval2 as u64));
            }
            _ = stop.changed() => {
                if *stop.borrow() && local_action == TestAction::Test {
                    local_action = TestAction::Stop1;
                }
            }
        }
    }

    summary
}

/// Static configuration a receiver loop needs.
#[derive(Clone, Copy)]
pub struct ReceiverConfig {
    pub params: TestParameters,
}

/// Per-datagram CSV export destination, opened once at receiver startup;
/// `interface_counter` is sampled on every datagram to populate the
/// `IntfMbps` column (omitted, reported as `0`, when absent).
#[cfg(feature = "csv-export")]
pub struct DatagramCsvConfig {
    pub path: std::path::PathBuf,
    pub interface_counter: Option<Arc<dyn udpst_transport_udp::ifcounter::InterfaceByteCounter>>,
}

/// One completed sub-interval, handed back on a channel so a caller (the
/// server's per-connection task, or the client's aggregator feed) can act
/// on it as soon as it rotates rather than waiting for the whole test to
/// end.
#[derive(Clone, Debug)]
pub struct SubIntervalEvent {
    pub index: u32,
    pub stats: udpst_wire::SubIntervalStats,
}

/// Runs the receiving side of one test connection: classifies inbound Load
/// PDUs, rotates sub-intervals on the negotiated period, and answers every
/// trial-interval boundary with a Status PDU carrying the current sending
/// rate back to the transmitter. Completed sub-intervals are pushed to
/// `sub_intervals`; the final saved sub-interval (if any occurred after the
/// last push) is included in the returned vector alongside everything sent
/// on the channel.
pub async fn run_receiver(
    endpoint: Arc<UdpEndpoint>,
    clock: Arc<dyn Clock>,
    cfg: ReceiverConfig,
    sending_rate: udpst_rate_table::SendingRate,
    sub_intervals: tokio::sync::mpsc::UnboundedSender<SubIntervalEvent>,
    mut stop: watch::Receiver<bool>,
    #[cfg(feature = "csv-export")] datagram_csv: Option<DatagramCsvConfig>,
) {
    let now = clock.now();
    let mut stats = ReceiverStats::new(LPDU_HISTORY_SIZE, now);
    #[cfg(feature = "csv-export")]
    if let Some(sink) = datagram_csv {
        if let Err(e) = stats.open_csv_sink(&sink.path, sink.interface_counter) {
            warn!(error = %e, path = %sink.path.display(), "failed to open per-datagram CSV export");
        }
    }
    let mut local_action = TestAction::Test;
    let mut spdu_seq_no = 0u32;
    let mut recv_buf = vec![0u8; 65536];

    let trial_period = Duration::from_millis(cfg.params.trial_interval_ms as u64);
    let sub_interval_period = Duration::from_secs(cfg.params.sub_interval_period_s as u64);
    let mut trial_ticker = tokio::time::interval(trial_period);
    let mut sub_interval_ticker = tokio::time::interval(sub_interval_period);
    trial_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    sub_interval_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            result = endpoint.readable() => {
                if result.is_err() {
                    continue;
                }
                match endpoint.try_recv(&mut recv_buf) {
                    Ok(n) => match decode_any(&recv_buf[..n]) {
                        Ok(AnyPdu::Load(pdu)) => {
                            let now = clock.now();
                            let outcome = stats.on_load_pdu(&pdu, now);
                            if outcome.rising_rx_stopped {
                                warn!("remote reports it has stopped receiving");
                            }
                            if outcome.rising_status_loss {
                                warn!("remote reports status-PDU loss");
                            }
                            if let Some(action) = pdu.test_action() {
                                if action != TestAction::Test {
                                    local_action = StopHandshake::advance(local_action, action);
                                }
                            }
                            trace!(seq = pdu.lpdu_seq_no, outcome = ?outcome.sequence, "load pdu processed");
                        }
                        Ok(_) => {}
                        Err(e) => trace!(error = %e, "dropped malformed load pdu"),
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => warn!(error = %e, "transient socket error on receiver"),
                }
            }
            _ = trial_ticker.tick() => {
                let snapshot = stats.snapshot_and_reset_trial();
                let now = clock.now();
                let mut status = StatusPdu {
                    test_action: local_action as u8,
                    rx_stopped: local_action != TestAction::Test,
                    spdu_seq_no,
                    sending_rate,
                    sub_interval_seq_no: stats.sub_interval_seq_no(),
                    saved: stats.last_saved().clone(),
                    seq_err_loss: 0,
                    seq_err_ooo: 0,
                    seq_err_dup: 0,
                    clock_delta_min_ms: 0,
                    delay_var_min_ms: 0,
                    delay_var_max_ms: 0,
                    delay_var_sum_ms: 0,
                    delay_var_cnt: 0,
                    rtt_minimum_ms: 0,
                    rtt_sample_ms: 0,
                    delay_min_updated: false,
                    trial_delta_time_ms: cfg.params.trial_interval_ms as u32,
                    trial_rx_datagrams: 0,
                    trial_rx_bytes: 0,
                    send_time_sec: now.secs as u32,
                    send_time_nsec: now.nanos,
                };
                snapshot.apply(&mut status);
                let (loss, ooo, dup) = stats.cumulative_seq_errors();
                status.seq_err_loss = loss;
                status.seq_err_ooo = ooo;
                status.seq_err_dup = dup;
                let _ = endpoint.try_send(&status.encode());
                spdu_seq_no = spdu_seq_no.wrapping_add(1);
            }
            _ = sub_interval_ticker.tick() => {
                let now = clock.now();
                stats.rotate_sub_interval(now);
                let _ = sub_intervals.send(SubIntervalEvent {
                    index: stats.sub_interval_seq_no(),
                    stats: stats.last_saved().clone(),
                });
            }
            _ = stop.changed() => {
                if *stop.borrow() && local_action == TestAction::Test {
                    local_action = TestAction::Stop1;
                }
                if local_action != TestAction::Test {
                    debug!("receiver loop ending on local stop request");
                    break;
                }
            }
        }
    }

    let now = clock.now();
    stats.rotate_sub_interval(now);
    let _ = sub_intervals.send(SubIntervalEvent { index: stats.sub_interval_seq_no(), stats: stats.last_saved().clone() });
}

/// Selects which role (transmitter/receiver) a local endpoint plays for a
/// given overall test direction, per the `TestUpstream`/`TestDownstream`
/// naming convention in `udpst_core::connection`: a local endpoint is the
/// transmitter exactly when it is the side sending load PDUs for the
/// negotiated direction.
pub fn local_is_transmitter(direction: udpst_core::config::Direction, is_client: bool) -> bool {
    use udpst_core::config::Direction;
    match direction {
        Direction::Upstream => is_client,
        Direction::Downstream => !is_client,
    }
}

pub fn algorithm_from_wire(v: u8) -> RateAlgorithm {
    if v == udpst_wire::RateAlgorithm::C as u8 {
        RateAlgorithm::C
    } else {
        RateAlgorithm::B
    }
}
