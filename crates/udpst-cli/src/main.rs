//! Binary entry point: wires [`cli::Cli`] parsing, `tracing` initialization,
//! and the server/client control handshakes on top of the per-connection
//! transmitter/receiver loops in [`engine`].
//!
//! # Why
//! Everything reusable (wire codec, control decision functions, rate
//! adjustment, receiver statistics, the async send/receive loops) lives in
//! library crates so it can be exercised without a socket. This binary is
//! the one place that owns a real control-port listener, turns a parsed
//! command line into the structs those libraries want, and prints a report.
//!
//! # What
//! `run_server` binds the control port, accepts Setup/Activation handshakes
//! per §4.5, and spawns one [`engine::run_transmitter`] or
//! [`engine::run_receiver`] task per accepted connection. `run_client` drives
//! the same two handshakes from the requesting side for one or more parallel
//! connections, then aggregates and prints the final report.
//!
//! # How
//! Grounded on `udpst.c::main`'s argument dispatch into `server_loop`/
//! `client_loop` and `udpst_control.c::service_setupreq`/`send_actreq` for
//! the handshake sequencing; the per-connection concurrency itself is the
//! tokio-task design documented in `engine`'s module doc comment and
//! `DESIGN.md`.

mod cli;
mod engine;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use udpst_core::auth::{AuthKeyring, HmacSha256, MacAlgorithm};
use udpst_core::bandwidth::BandwidthBudget;
use udpst_core::config::{Direction, RateAlgorithm, TestParameters};
use udpst_core::control::{
    accept_setup_request, negotiate_activation, sign_setup_request, AuthTimeWindow, ProtocolConfig,
    SetupDecision,
};
use udpst_core::time::{Clock, SystemClock};
use udpst_rate_table::{RateTable, RateTableConfig};
use udpst_transport_udp::{UdpEndpoint, UdpSocketOptions};
use udpst_wire::{
    decode_any, AnyPdu, ActivationCmdRequest, ActivationCmdResponse, ActivationPdu, AuthMode,
    SetupCmdResponse, SetupPdu,
};

use cli::{Cli, ClientArgs, Mode, ServerArgs};
use engine::{
    local_is_transmitter, run_receiver, run_transmitter, ReceiverConfig, SubIntervalEvent, TransmitterConfig,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, &cli.log_filter);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        match cli.mode {
            Mode::Server(args) => run_server(args).await,
            Mode::Client(args) => run_client(args).await,
        }
    })
}

fn init_tracing(json: bool, filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------

/// Server-wide state shared across every accepted connection's task.
struct ServerState {
    policy: ProtocolConfig,
    keyring: AuthKeyring,
    budget: Mutex<BandwidthBudget>,
    table: Arc<RateTable>,
    clock: Arc<dyn Clock>,
    max_test_interval_s: u16,
    max_ip_tos_byte: u8,
    active_connections: AtomicU32,
    max_connections: usize,
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let table = Arc::new(
        RateTable::build(RateTableConfig {
            jumbo: args.jumbo,
            traditional_mtu: args.traditional_mtu,
            ipv6_only: false,
        })
        .map_err(|e| anyhow::anyhow!("failed to build sending-rate table: {e}"))?,
    );

    let mut keyring = AuthKeyring::new();
    if let Some(key) = &args.auth_key {
        keyring = AuthKeyring::single(key.clone());
    }

    let state = Arc::new(ServerState {
        policy: ProtocolConfig {
            jumbo: args.jumbo,
            traditional_mtu: args.traditional_mtu,
            auth_required: args.auth_required,
            max_mc_count: 64,
        },
        keyring,
        budget: Mutex::new(BandwidthBudget::new(if args.max_bandwidth_mbps == 0 {
            None
        } else {
            Some(args.max_bandwidth_mbps)
        })),
        table,
        clock: Arc::new(SystemClock::new()),
        max_test_interval_s: args.max_test_interval_s,
        max_ip_tos_byte: args.max_ip_tos_byte,
        active_connections: AtomicU32::new(0),
        max_connections: args.max_connections,
    });

    let bind_addr = args.bind.unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
    let control = match UdpEndpoint::bind(SocketAddr::new(bind_addr, args.port), UdpSocketOptions::default()) {
        Ok(endpoint) => endpoint,
        Err(e) if args.bind.is_none() => {
            warn!(error = %e, "dual-stack bind failed, falling back to IPv4");
            UdpEndpoint::bind(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port),
                UdpSocketOptions::default(),
            )?
        }
        Err(e) => return Err(e.into()),
    };
    let control = Arc::new(control);
    info!(port = args.port, "listening for setup requests");

    let mut recv_buf = vec![0u8; 2048];
    loop {
        control.readable().await?;
        let (n, peer_addr) = match control.try_recv_from(&mut recv_buf) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                warn!(error = %e, "transient error reading control socket");
                continue;
            }
        };

        match decode_any(&recv_buf[..n]) {
            Ok(AnyPdu::Setup(request)) => {
                let state = state.clone();
                let control = control.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_setup_request(state, control, request, peer_addr).await {
                        warn!(error = %e, peer = %peer_addr, "setup request handling failed");
                    }
                });
            }
            Ok(_) => debug!(peer = %peer_addr, "dropped non-setup PDU on control socket"),
            Err(e) => debug!(peer = %peer_addr, error = %e, "dropped malformed datagram on control socket"),
        }
    }
}

async fn handle_setup_request(
    state: Arc<ServerState>,
    control: Arc<UdpEndpoint>,
    request: SetupPdu,
    peer_addr: SocketAddr,
) -> anyhow::Result<()> {
    let now_unix = unix_now();
    let auth_window = AuthTimeWindow { now_unix_secs: now_unix, window_secs: udpst_core::config::AUTH_TIME_WINDOW_S as u32 };

    if state.active_connections.load(Ordering::SeqCst) as usize >= state.max_connections {
        let mut response = request.clone();
        response.cmd_response = SetupCmdResponse::AllocationFailure as u8;
        control.try_send_to(&response.encode(), peer_addr)?;
        return Ok(());
    }

    let mut budget = state.budget.lock().await;
    let decision = accept_setup_request(
        &request,
        &state.policy,
        &mut budget,
        &state.keyring,
        &HmacSha256,
        auth_window,
    );
    drop(budget);

    match decision {
        SetupDecision::Reject { response, .. } => {
            control.try_send_to(&response.encode(), peer_addr)?;
        }
        SetupDecision::Accept { direction, bandwidth_mbps, mut response } => {
            let test_endpoint = UdpEndpoint::bind(
                SocketAddr::new(local_unspecified(peer_addr), 0),
                UdpSocketOptions {
                    recv_buffer_bytes: Some(udpst_core::config::DEF_SOCKET_BUFFER_BYTES),
                    send_buffer_bytes: Some(udpst_core::config::DEF_SOCKET_BUFFER_BYTES),
                    ..Default::default()
                },
            );
            let test_endpoint = match test_endpoint {
                Ok(e) => e,
                Err(e) => {
                    let mut budget = state.budget.lock().await;
                    budget.release(direction, bandwidth_mbps);
                    response.cmd_response = SetupCmdResponse::AllocationFailure as u8;
                    control.try_send_to(&response.encode(), peer_addr)?;
                    return Err(e.into());
                }
            };
            test_endpoint.connect(peer_addr).await?;
            response.test_port = test_endpoint.local_addr()?.port();
            control.try_send_to(&response.encode(), peer_addr)?;

            state.active_connections.fetch_add(1, Ordering::SeqCst);
            let state2 = state.clone();
            tokio::spawn(async move {
                run_server_connection(state2.clone(), Arc::new(test_endpoint), direction, bandwidth_mbps).await;
                state2.active_connections.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }
    Ok(())
}

async fn run_server_connection(
    state: Arc<ServerState>,
    endpoint: Arc<UdpEndpoint>,
    direction: Direction,
    bandwidth_mbps: u32,
) {
    let mut recv_buf = vec![0u8; 65536];
    let activation_request = loop {
        if endpoint.readable().await.is_err() {
            return;
        }
        let n = match endpoint.try_recv(&mut recv_buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(_) => return,
        };
        match ActivationPdu::decode(&recv_buf[..n]) {
            Ok(pdu) => break pdu,
            Err(e) => {
                debug!(error = %e, "dropped malformed activation request, still awaiting one");
                continue;
            }
        }
    };

    let outcome = negotiate_activation(
        &activation_request,
        &state.table,
        state.max_test_interval_s,
        state.max_ip_tos_byte,
        0,
    );
    let initial_row_index = outcome.initial_row_index;

    if outcome.params.ip_tos_byte != 0 {
        let _ = endpoint.set_dscp(matches!(endpoint.local_addr(), Ok(a) if a.is_ipv6()), outcome.params.ip_tos_byte);
    }
    if endpoint.try_send(&outcome.response.encode()).is_err() {
        let mut budget = state.budget.lock().await;
        budget.release(direction, bandwidth_mbps);
        return;
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let params = outcome.params;
    let table = state.table.clone();
    let clock = state.clock.clone();

    let join: JoinHandle<()> = if local_is_transmitter(direction, false) {
        let cfg = TransmitterConfig {
            params,
            initial_index: initial_row_index,
            max_index: table.len() - 1,
            high_speed_threshold: table.high_speed_threshold(),
            ipv6: matches!(endpoint.local_addr(), Ok(a) if a.is_ipv6()),
            rate_limit_mbps: if bandwidth_mbps > 0 { Some(bandwidth_mbps as u64) } else { None },
            random_content: params.random_payload,
        };
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            let summary = run_transmitter(endpoint, table, clock, cfg, stop_rx).await;
            debug!(datagrams = summary.datagrams_sent, bytes = summary.bytes_sent, "server transmitter finished");
        })
    } else {
        let cfg = ReceiverConfig { params };
        let endpoint = endpoint.clone();
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            tokio::spawn(async move { while sub_rx.recv().await.is_some() {} });
            run_receiver(
                endpoint,
                clock,
                cfg,
                outcome.response.sending_rate,
                sub_tx,
                stop_rx,
                #[cfg(feature = "csv-export")]
                None,
            )
            .await;
        })
    };

    tokio::time::sleep(Duration::from_secs(params.test_interval_s as u64)).await;
    let _ = stop_tx.send(true);
    let _ = join.await;

    let mut budget = state.budget.lock().await;
    budget.release(direction, bandwidth_mbps);
}

fn local_unspecified(peer: SocketAddr) -> IpAddr {
    if peer.is_ipv6() {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    } else {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }
}

// ---------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let (min_conns, max_conns) = cli::parse_connection_range(&args.connections).map_err(anyhow::Error::msg)?;
    let connections = max_conns.max(min_conns).max(1);
    let sr_index = cli::parse_sr_index(&args.sr_index).map_err(anyhow::Error::msg)?;

    let server_addr = resolve_server_addr(&args)?;
    let direction = if args.upstream { Direction::Upstream } else { Direction::Downstream };
    let algorithm = if args.algorithm.eq_ignore_ascii_case("c") { RateAlgorithm::C } else { RateAlgorithm::B };

    let table = Arc::new(
        RateTable::build(RateTableConfig { jumbo: args.jumbo, traditional_mtu: args.traditional_mtu, ipv6_only: server_addr.is_ipv6() })
            .map_err(|e| anyhow::anyhow!("failed to build sending-rate table: {e}"))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let mut join_set = Vec::new();
    for mc_index in 0..connections {
        let server_addr = server_addr;
        let table = table.clone();
        let clock = clock.clone();
        let args = args.clone();
        let handle = tokio::spawn(async move {
            run_single_connection(server_addr, mc_index as u16, connections as u16, direction, algorithm, sr_index, table, clock, args).await
        });
        join_set.push(handle);
    }

    let mut aggregator = udpst_core::aggregate::Aggregator::new(server_addr.is_ipv6(), 0);
    let mut transmitted_bytes = 0u64;
    let mut transmitted_datagrams = 0u64;
    for handle in join_set {
        match handle.await {
            Ok(Ok(ConnectionOutcome::Received(events))) => {
                for event in events {
                    let contribution = udpst_core::aggregate::ConnectionContribution::from_saved(&event.stats);
                    aggregator.fold_sub_interval(&[contribution]);
                }
            }
            Ok(Ok(ConnectionOutcome::Transmitted(summary))) => {
                transmitted_bytes += summary.bytes_sent;
                transmitted_datagrams += summary.datagrams_sent;
            }
            Ok(Err(e)) => error!(error = %e, "connection failed"),
            Err(e) => error!(error = %e, "connection task panicked"),
        }
    }

    print_report(&args, direction, &aggregator, transmitted_datagrams, transmitted_bytes)?;
    Ok(())
}

enum ConnectionOutcome {
    Received(Vec<SubIntervalEvent>),
    Transmitted(engine::TransmitterSummary),
}

#[allow(clippy::too_many_arguments)]
async fn run_single_connection(
    server_addr: SocketAddr,
    mc_index: u16,
    mc_count: u16,
    direction: Direction,
    algorithm: RateAlgorithm,
    sr_index: cli::SrIndexSelection,
    table: Arc<RateTable>,
    clock: Arc<dyn Clock>,
    args: ClientArgs,
) -> anyhow::Result<ConnectionOutcome> {
    let control = UdpEndpoint::bind(SocketAddr::new(local_unspecified(server_addr), 0), UdpSocketOptions::default())?;

    let mut request = SetupPdu {
        protocol_version: udpst_core::control::PROTOCOL_VERSION,
        mc_index,
        mc_count,
        mc_ident: rand::thread_rng().gen(),
        cmd_request: 1,
        cmd_response: 0,
        max_bandwidth: SetupPdu::encode_max_bandwidth(args.max_bandwidth_mbps, args.upstream),
        jumbo: args.jumbo,
        traditional_mtu: args.traditional_mtu,
        auth_mode: if args.auth_key.is_some() { AuthMode::HmacSha256 as u8 } else { AuthMode::None as u8 },
        auth_unix_time: unix_now(),
        key_id: 0,
        test_port: 0,
        digest: [0u8; udpst_wire::AUTH_DIGEST_LENGTH],
    };
    if let Some(key) = &args.auth_key {
        sign_setup_request(&mut request, Some(key.as_bytes()), &HmacSha256);
    }

    control.try_send_to(&request.encode(), server_addr)?;
    let response = await_reply(&control, |buf| SetupPdu::decode(buf)).await?;
    if response.cmd_response() != Some(SetupCmdResponse::Ack) {
        anyhow::bail!("setup request rejected: {:?}", response.cmd_response());
    }
    let test_addr = SocketAddr::new(server_addr.ip(), response.test_port);

    let endpoint = UdpEndpoint::bind(
        SocketAddr::new(local_unspecified(server_addr), 0),
        UdpSocketOptions {
            recv_buffer_bytes: Some(udpst_core::config::DEF_SOCKET_BUFFER_BYTES),
            send_buffer_bytes: Some(udpst_core::config::DEF_SOCKET_BUFFER_BYTES),
            dscp: Some(args.dscp),
            ..Default::default()
        },
    )?;
    endpoint.connect(test_addr).await?;
    let endpoint = Arc::new(endpoint);

    let activation_request = ActivationPdu {
        protocol_version: udpst_core::control::PROTOCOL_VERSION,
        cmd_request: if args.upstream { ActivationCmdRequest::ActivateUpstream as u8 } else { ActivationCmdRequest::ActivateDownstream as u8 },
        cmd_response: 0,
        low_thresh_ms: args.low_thresh_ms,
        upper_thresh_ms: args.upper_thresh_ms,
        trial_interval_ms: args.trial_interval_ms,
        test_interval_s: args.test_interval_s,
        sub_interval_period_s: args.sub_interval_period_s,
        ip_tos_byte: args.dscp,
        sr_index_conf: sr_index.sr_index_conf,
        sr_index_is_start: sr_index.sr_index_is_start,
        random_payload: args.random_payload,
        high_speed_delta: args.high_speed_delta,
        slow_adjust_threshold: args.slow_adjust_threshold,
        seq_error_threshold: args.seq_error_threshold,
        algorithm: algorithm as u8,
        one_way_delay: !args.one_way_delay,
        ignore_oo_dup: args.ignore_reorder,
        sending_rate: Default::default(),
    };
    endpoint.try_send(&activation_request.encode())?;
    let activation_response = await_reply(&endpoint, |buf| ActivationPdu::decode(buf)).await?;
    if activation_response.cmd_response() != Some(ActivationCmdResponse::Ack) {
        anyhow::bail!("activation request rejected");
    }

    let initial_index = if sr_index.sr_index_conf != udpst_core::config::DEF_SR_INDEX_CONF {
        sr_index.sr_index_conf as usize
    } else {
        0
    };
    let params = TestParameters {
        low_thresh_ms: activation_response.low_thresh_ms,
        upper_thresh_ms: activation_response.upper_thresh_ms,
        trial_interval_ms: activation_response.trial_interval_ms,
        test_interval_s: activation_response.test_interval_s,
        sub_interval_period_s: activation_response.sub_interval_period_s,
        ip_tos_byte: activation_response.ip_tos_byte,
        sr_index_conf: activation_response.sr_index_conf,
        sr_index_is_start: activation_response.sr_index_is_start,
        random_payload: activation_response.random_payload,
        high_speed_delta: activation_response.high_speed_delta,
        slow_adjust_threshold: activation_response.slow_adjust_threshold,
        seq_error_threshold: activation_response.seq_error_threshold,
        algorithm,
        one_way_delay: activation_response.one_way_delay,
        ignore_oo_dup: activation_response.ignore_oo_dup,
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_after = Duration::from_secs(params.test_interval_s as u64);

    if local_is_transmitter(direction, true) {
        let cfg = TransmitterConfig {
            params,
            initial_index,
            max_index: table.len() - 1,
            high_speed_threshold: table.high_speed_threshold(),
            ipv6: server_addr.is_ipv6(),
            rate_limit_mbps: if args.max_bandwidth_mbps > 0 { Some(args.max_bandwidth_mbps as u64) } else { None },
            random_content: args.random_payload,
        };
        let endpoint2 = endpoint.clone();
        let handle = tokio::spawn(run_transmitter(endpoint2, table, clock, cfg, stop_rx));
        tokio::time::sleep(stop_after).await;
        let _ = stop_tx.send(true);
        let summary = handle.await?;
        Ok(ConnectionOutcome::Transmitted(summary))
    } else {
        let cfg = ReceiverConfig { params };
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
        let endpoint2 = endpoint.clone();
        #[cfg(feature = "csv-export")]
        let datagram_csv = args.datagram_csv_path.as_ref().map(|path| engine::DatagramCsvConfig {
            path: path.clone(),
            interface_counter: args.datagram_csv_interface.as_ref().map(|iface| {
                Arc::new(udpst_transport_udp::ifcounter::LinuxSysfsByteCounter::new(iface.clone()))
                    as Arc<dyn udpst_transport_udp::ifcounter::InterfaceByteCounter>
            }),
        });
        let handle = tokio::spawn(run_receiver(
            endpoint2,
            clock,
            cfg,
            activation_response.sending_rate,
            sub_tx,
            stop_rx,
            #[cfg(feature = "csv-export")]
            datagram_csv,
        ));
        let mut events = Vec::new();
        let collector = tokio::spawn(async move {
            while let Some(event) = sub_rx.recv().await {
                events.push(event);
            }
            events
        });
        tokio::time::sleep(stop_after).await;
        let _ = stop_tx.send(true);
        handle.await?;
        let events = collector.await?;
        Ok(ConnectionOutcome::Received(events))
    }
}

async fn await_reply<T>(endpoint: &UdpEndpoint, decode: impl Fn(&[u8]) -> Result<T, udpst_wire::WireError>) -> anyhow::Result<T> {
    let mut buf = vec![0u8; 2048];
    let timeout = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(timeout);
    loop {
        tokio::select! {
            result = endpoint.readable() => {
                result?;
                match endpoint.try_recv(&mut buf) {
                    Ok(n) => match decode(&buf[..n]) {
                        Ok(pdu) => return Ok(pdu),
                        Err(_) => continue,
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            _ = &mut timeout => anyhow::bail!("timed out waiting for a reply"),
        }
    }
}

fn resolve_server_addr(args: &ClientArgs) -> anyhow::Result<SocketAddr> {
    let (host, port) = match args.server.rsplit_once(':') {
        Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, p.parse::<u16>()?),
        _ => (args.server.as_str(), udpst_core::config::DEF_CONTROL_PORT),
    };
    let want_v6 = args.ipv6 && !args.ipv4;
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| anyhow::anyhow!("failed to resolve {host}: {e}"))?
        .collect();
    candidates
        .iter()
        .find(|a| a.is_ipv6() == want_v6 || (!args.ipv4 && !args.ipv6))
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("{} resolved to no addresses", args.server))
}

fn unix_now() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

use std::net::ToSocketAddrs;

// ---------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------

#[derive(serde::Serialize)]
struct Report {
    direction: &'static str,
    connections: usize,
    mean_l3_mbps: f64,
    total_loss: u64,
    total_ooo: u64,
    total_dup: u64,
    rtt_min_ms: Option<u32>,
    rtt_max_ms: u32,
    delay_var_min_ms: Option<u32>,
    delay_var_max_ms: u32,
    bimodal_max_l3_mbps: Vec<f64>,
    transmitted_datagrams: u64,
    transmitted_bytes: u64,
}

fn print_report(
    args: &ClientArgs,
    direction: Direction,
    aggregator: &udpst_core::aggregate::Aggregator,
    transmitted_datagrams: u64,
    transmitted_bytes: u64,
) -> anyhow::Result<()> {
    let summary = aggregator.summary();
    let report = Report {
        direction: if direction == Direction::Upstream { "upstream" } else { "downstream" },
        connections: aggregator.history().len().max(1),
        mean_l3_mbps: summary.mean_l3_mbps(),
        total_loss: summary.total_loss,
        total_ooo: summary.total_ooo,
        total_dup: summary.total_dup,
        rtt_min_ms: summary.rtt_min_ms,
        rtt_max_ms: summary.rtt_max_ms,
        delay_var_min_ms: summary.delay_var_min_ms,
        delay_var_max_ms: summary.delay_var_max_ms,
        bimodal_max_l3_mbps: aggregator.bimodal_snapshots().iter().map(|s| s.rate_l3_mbps).collect(),
        transmitted_datagrams,
        transmitted_bytes,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("direction:            {}", report.direction);
        println!("mean L3 rate:         {:.3} Mbps", report.mean_l3_mbps);
        println!("sequence errors:      loss={} ooo={} dup={}", report.total_loss, report.total_ooo, report.total_dup);
        if let Some(min) = report.rtt_min_ms {
            println!("rtt:                  min={min}ms max={}ms", report.rtt_max_ms);
        }
        if let Some(min) = report.delay_var_min_ms {
            println!("one-way delay var:    min={min}ms max={}ms", report.delay_var_max_ms);
        }
        if report.transmitted_datagrams > 0 {
            println!("transmitted:          {} datagrams, {} bytes", report.transmitted_datagrams, report.transmitted_bytes);
        }
    }

    #[cfg(feature = "csv-export")]
    if let Some(path) = &args.csv_path {
        write_csv_report(path, aggregator)?;
    }
    #[cfg(not(feature = "csv-export"))]
    if args.csv_path.is_some() {
        warn!("--csv-path was given but this binary was built without the csv-export feature");
    }

    Ok(())
}

#[cfg(feature = "csv-export")]
fn write_csv_report(path: &std::path::Path, aggregator: &udpst_core::aggregate::Aggregator) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["sub_interval", "rate_l3_mbps", "rate_l2_mbps", "seq_err_loss", "seq_err_ooo", "seq_err_dup"])?;
    for (index, record) in aggregator.history().iter().enumerate() {
        writer.write_record([
            (index + 1).to_string(),
            format!("{:.3}", record.rate_l3_mbps),
            format!("{:.3}", record.rate_l2_mbps),
            record.seq_err_loss.to_string(),
            record.seq_err_ooo.to_string(),
            record.seq_err_dup.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
