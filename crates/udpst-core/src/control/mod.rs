//! Control State Machine (C5): the Setup Request/Response and Test
//! Activation Request/Response handshakes, expressed as pure functions over
//! PDUs and already-owned server/client state.
//!
//! # Why
//! Keeping the handshake logic free of socket/timer plumbing (those belong
//! to the event loop, C4) means every branch of §4.5's acceptance,
//! clamping, and tie-break rules can be exercised directly with a
//! hand-built PDU and no transport at all.
//!
//! # What
//! [`ProtocolConfig`] is the server's static acceptance policy (version,
//! jumbo/traditional-MTU mode, bandwidth ceiling, authentication). [`accept_setup_request`]
//! runs the full Setup Request decision tree and returns a [`SetupDecision`]
//! the caller uses to allocate a connection slot (or not) and build a
//! response PDU. [`negotiate_activation`] clamps a client's requested test
//! parameters into a server-accepted [`TestParameters`] and an echo
//! [`ActivationPdu`]. [`StopHandshake`] implements the two-phase stop
//! protocol from §4.5's "Stop handshake" paragraph.
//!
//! # How
//! Grounded on `udpst_control.c::service_setupreq` (acceptance order: version,
//! multi-connection parameters, jumbo/traditional-MTU match, bandwidth,
//! authentication) and `service_actreq` (per-field clamp-then-echo, in the
//! same field order the reference source applies them).

use udpst_rate_table::RateTable;
use udpst_wire::{
    ActivationCmdRequest, ActivationCmdResponse, ActivationPdu, AuthMode, SetupCmdRequest, SetupCmdResponse, SetupPdu,
};

use crate::auth::{AuthKeyring, MacAlgorithm};
use crate::bandwidth::BandwidthBudget;
use crate::config::{Direction, RateAlgorithm, TestParameters};
use crate::connection::TestAction;

/// Protocol version this build speaks. Not present in the retrieved header
/// subset as a pair of bounds; `PROTOCOL_MIN`/`PROTOCOL_VERSION` are fixed
/// here as an Open Question resolution (see `DESIGN.md`), matching the one
/// concrete number (`7`) the reference protocol header does carry.
pub const PROTOCOL_VERSION: u8 = 7;
pub const PROTOCOL_MIN: u8 = 1;

/// Server-side static acceptance policy, built once from `udpst-cli`'s
/// parsed configuration.
#[derive(Clone, Debug)]
pub struct ProtocolConfig {
    pub jumbo: bool,
    pub traditional_mtu: bool,
    pub auth_required: bool,
    pub max_mc_count: u16,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self { jumbo: false, traditional_mtu: false, auth_required: false, max_mc_count: 64 }
    }
}

/// Outcome of running a Setup Request through the server's acceptance
/// checks.
#[derive(Debug)]
pub enum SetupDecision {
    /// Request accepted: the caller should allocate a new connection slot,
    /// reserve `bandwidth_mbps` (already done against `budget` by the time
    /// this variant is returned) in `direction`, and reply with `response`
    /// once `response.test_port` is filled in.
    Accept { direction: Direction, bandwidth_mbps: u32, response: SetupPdu },
    /// Request rejected; `response` already carries the rejection code and
    /// is ready to send back unmodified.
    Reject { code: SetupCmdResponse, response: SetupPdu },
}

/// Runs a Setup Request through every acceptance check in §4.5's order:
/// protocol version, multi-connection parameters, jumbo/traditional-MTU
/// match, bandwidth headroom, then authentication. The first failing check
/// wins; a request that fails bandwidth admission never reaches the
/// authentication check, matching `service_setupreq`'s `else if` chain.
///
/// On success, `budget` has already had `bandwidth_mbps` reserved in it;
/// callers that go on to fail slot allocation for any other reason must
/// call [`BandwidthBudget::release`] themselves.
pub fn accept_setup_request(
    request: &SetupPdu,
    policy: &ProtocolConfig,
    budget: &mut BandwidthBudget,
    keyring: &AuthKeyring,
    mac: &dyn MacAlgorithm,
    auth_window: AuthTimeWindow,
) -> SetupDecision {
    let mut response = request.clone();
    response.cmd_request = SetupCmdRequest::Response as u8;
    response.cmd_response = SetupCmdResponse::Ack as u8;

    let reject = |response: &mut SetupPdu, code: SetupCmdResponse| {
        response.cmd_response = code as u8;
    };

    if request.protocol_version < PROTOCOL_MIN || request.protocol_version > PROTOCOL_VERSION {
        response.protocol_version = PROTOCOL_VERSION;
        reject(&mut response, SetupCmdResponse::BadVersion);
    } else if request.mc_count == 0 || request.mc_count > policy.max_mc_count || request.mc_index >= request.mc_count {
        reject(&mut response, SetupCmdResponse::BadMultiConnParams);
    } else if request.jumbo != policy.jumbo {
        reject(&mut response, SetupCmdResponse::BadJumboSettings);
    } else if request.traditional_mtu != policy.traditional_mtu {
        reject(&mut response, SetupCmdResponse::BadTraditionalMtu);
    } else if let Some(code) = check_bandwidth(request, budget) {
        reject(&mut response, code);
    } else if let Some(code) = check_auth(request, policy, keyring, mac, auth_window) {
        // Bandwidth was provisionally reserved above the auth check in the
        // reference source's acceptance order is actually bandwidth-then-auth,
        // so a failing auth check must give back what bandwidth already
        // committed.
        release_if_declared(request, budget);
        reject(&mut response, code);
    } else {
        let direction = if request.upstream() { Direction::Upstream } else { Direction::Downstream };
        let bandwidth_mbps = request.bandwidth_value();
        return SetupDecision::Accept { direction, bandwidth_mbps, response };
    }

    SetupDecision::Reject { code: response.cmd_response().unwrap_or(SetupCmdResponse::BadVersion), response }
}

fn check_bandwidth(request: &SetupPdu, budget: &mut BandwidthBudget) -> Option<SetupCmdResponse> {
    let direction = if request.upstream() { Direction::Upstream } else { Direction::Downstream };
    let mbw = request.bandwidth_value();
    match budget.reserve(direction, mbw) {
        Ok(()) => None,
        Err(_) => Some(SetupCmdResponse::BandwidthExceeded),
    }
}

fn release_if_declared(request: &SetupPdu, budget: &mut BandwidthBudget) {
    let direction = if request.upstream() { Direction::Upstream } else { Direction::Downstream };
    budget.release(direction, request.bandwidth_value());
}

/// `(now_unix_secs, window_secs)`: the authentication timestamp tolerance
/// from §4.5 ("auth mode, MAC, optional time window ±150 s").
#[derive(Clone, Copy, Debug)]
pub struct AuthTimeWindow {
    pub now_unix_secs: u32,
    pub window_secs: u32,
}

fn check_auth(
    request: &SetupPdu,
    policy: &ProtocolConfig,
    keyring: &AuthKeyring,
    mac: &dyn MacAlgorithm,
    window: AuthTimeWindow,
) -> Option<SetupCmdResponse> {
    match request.auth_mode() {
        None => Some(SetupCmdResponse::AuthInvalid),
        Some(AuthMode::None) => {
            if policy.auth_required {
                Some(SetupCmdResponse::AuthRequired)
            } else {
                None
            }
        }
        Some(AuthMode::HmacSha256) => {
            if keyring.is_empty() {
                return Some(SetupCmdResponse::AuthNotConfigured);
            }
            let key_id = keyring.resolve_key_id(request.protocol_version, request.key_id);
            let Some(key) = keyring.key(key_id) else {
                return Some(SetupCmdResponse::AuthFailed);
            };
            let mut verify_copy = request.clone();
            verify_copy.digest = [0u8; udpst_wire::AUTH_DIGEST_LENGTH];
            if !mac.verify(key, &verify_copy.encode(), &request.digest) {
                return Some(SetupCmdResponse::AuthFailed);
            }
            let delta = (request.auth_unix_time as i64) - (window.now_unix_secs as i64);
            if delta.unsigned_abs() > window.window_secs as u64 {
                return Some(SetupCmdResponse::AuthTimeExceeded);
            }
            None
        }
    }
}

/// Signs `request` in place (digest field, then checksum), mirroring
/// `send_setupreq`'s `HMAC(...)` followed by `checksum(...)` ordering. No-op
/// when `key` is `None` (unauthenticated setup).
pub fn sign_setup_request(request: &mut SetupPdu, key: Option<&[u8]>, mac: &dyn MacAlgorithm) {
    if let Some(key) = key {
        request.digest = [0u8; udpst_wire::AUTH_DIGEST_LENGTH];
        request.digest = mac.digest(key, &request.encode());
    }
}

/// Outcome of clamping a Test Activation Request: the server-side
/// [`TestParameters`] the connection will actually run with, the response
/// PDU (already carrying every clamped/echoed field), and the resolved
/// starting sending-rate row index (the same row embedded in the response
/// for an upstream test; irrelevant, but still well-defined, otherwise).
pub struct ActivationOutcome {
    pub params: TestParameters,
    pub response: ActivationPdu,
    pub initial_row_index: usize,
}

/// Clamps every field of an activation request into policy bounds (§4.5,
/// §B.1) and builds the echo response. `server_max_test_interval_s` and
/// `server_max_ip_tos_byte` are the server operator's own configured
/// ceilings (clamped further on top of the universal min/max table);
/// `default_row_index` is the starting sending-rate table row to embed
/// when `direction == Upstream` and the client left `sr_index_conf` at its
/// sentinel (no explicit request) — a fixed, explicit `sr_index_conf` is
/// always honored as the starting row instead, mirroring
/// `service_actreq`'s `c->srIndex = c->srIndexConf` assignment.
pub fn negotiate_activation(
    request: &ActivationPdu,
    rate_table: &RateTable,
    server_max_test_interval_s: u16,
    server_max_ip_tos_byte: u8,
    default_row_index: usize,
) -> ActivationOutcome {
    let requested = TestParameters {
        low_thresh_ms: request.low_thresh_ms,
        upper_thresh_ms: request.upper_thresh_ms,
        trial_interval_ms: request.trial_interval_ms,
        test_interval_s: request.test_interval_s,
        sub_interval_period_s: request.sub_interval_period_s,
        ip_tos_byte: request.ip_tos_byte,
        sr_index_conf: request.sr_index_conf,
        sr_index_is_start: request.sr_index_is_start,
        random_payload: request.random_payload,
        high_speed_delta: request.high_speed_delta,
        slow_adjust_threshold: request.slow_adjust_threshold,
        seq_error_threshold: request.seq_error_threshold,
        algorithm: if request.algorithm == udpst_wire::RateAlgorithm::C as u8 { RateAlgorithm::C } else { RateAlgorithm::B },
        one_way_delay: request.one_way_delay,
        ignore_oo_dup: request.ignore_oo_dup,
    };

    let mut params = requested.clamp((rate_table.len() - 1) as u16);
    if params.test_interval_s > server_max_test_interval_s {
        params.test_interval_s = server_max_test_interval_s;
    }
    if params.ip_tos_byte > server_max_ip_tos_byte {
        params.ip_tos_byte = server_max_ip_tos_byte;
    }

    let direction = request
        .cmd_request()
        .map(|c| if c == ActivationCmdRequest::ActivateUpstream { Direction::Upstream } else { Direction::Downstream })
        .unwrap_or(Direction::Downstream);

    let start_index = if params.sr_index_conf != crate::config::DEF_SR_INDEX_CONF {
        params.sr_index_conf as usize
    } else {
        default_row_index
    };

    let sending_rate = if direction == Direction::Upstream {
        *rate_table.row(start_index).unwrap_or(&Default::default())
    } else {
        Default::default()
    };

    let response = ActivationPdu {
        protocol_version: request.protocol_version,
        cmd_request: request.cmd_request,
        cmd_response: ActivationCmdResponse::Ack as u8,
        low_thresh_ms: params.low_thresh_ms,
        upper_thresh_ms: params.upper_thresh_ms,
        trial_interval_ms: params.trial_interval_ms,
        test_interval_s: params.test_interval_s,
        sub_interval_period_s: params.sub_interval_period_s,
        ip_tos_byte: params.ip_tos_byte,
        sr_index_conf: params.sr_index_conf,
        sr_index_is_start: params.sr_index_is_start,
        random_payload: params.random_payload,
        high_speed_delta: params.high_speed_delta,
        slow_adjust_threshold: params.slow_adjust_threshold,
        seq_error_threshold: params.seq_error_threshold,
        algorithm: request.algorithm,
        one_way_delay: params.one_way_delay,
        ignore_oo_dup: params.ignore_oo_dup,
        sending_rate,
    };

    ActivationOutcome { params, response, initial_row_index: start_index }
}

/// The two-phase stop handshake from §4.5: either side may set its outbound
/// `testAction` to `Stop1`; on observing a peer PDU carrying `Stop1` or
/// `Stop2`, the receiver advances its own action and (if it was the
/// original proposer) schedules an immediate end.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StopHandshake;

impl StopHandshake {
    /// Local action to emit on the *next* outbound PDU after observing
    /// `peer_action` on the local connection's `current` action, per the
    /// handshake's advance rule: a peer already in `Stop1`/`Stop2` pulls the
    /// local side's action forward to at least `Stop2` once it was already
    /// stopping, or to `Stop1` if this side is the first to notice the peer
    /// stopped and hasn't initiated a stop itself yet.
    pub fn advance(current: TestAction, peer_action: TestAction) -> TestAction {
        match (current, peer_action) {
            (TestAction::Test, TestAction::Test) => TestAction::Test,
            (TestAction::Test, _) => TestAction::Stop1,
            (TestAction::Stop1, TestAction::Stop1) | (TestAction::Stop1, TestAction::Stop2) => TestAction::Stop2,
            (current, _) => current,
        }
    }

    /// Whether observing `peer_action` on a connection whose own `current`
    /// action already indicates a stop means the originator should schedule
    /// an immediate end-time, per "the originator schedules immediate
    /// end-time on observing the peer's STOP".
    pub fn originator_should_end(current: TestAction, peer_action: TestAction) -> bool {
        current != TestAction::Test && peer_action != TestAction::Test
    }
}
