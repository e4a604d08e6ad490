//! Command-line surface (§6 EXTERNAL INTERFACES).
//!
//! # Why
//! The reference binary takes every test parameter as a single-letter
//! `getopt` flag (`udpst.c`'s `"ud46C:x1evsf:jTDXSB:ri:oRa:m:I:t:P:p:A:b:L:U:F:c:h:q:E:Ml:k:?"`).
//! `clap`'s derive API gives the same flag inventory a typed, self-
//! documenting home without hand-rolling an option parser, while keeping one
//! long flag per short C option so `--help` stays readable.
//!
//! # What
//! [`Cli`] is the top-level parsed command line: a [`Mode`] subcommand
//! (`server`/`client`) plus the shared bits each needs. [`parse_sr_index`]
//! and [`parse_connection_range`] turn the two string-shaped options
//! (`sr-index`, `connections`) into the typed values `udpst-core` wants.
//!
//! # How
//! Every numeric bound here is enforced again by
//! [`udpst_core::config::TestParameters::clamp`] once the server sees the
//! request; this module only rejects what cannot possibly round-trip
//! through the wire types (e.g. a `connections` range with `max < min`).

use std::net::IpAddr;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "udpst", author, version, about = "UDP path-capacity measurement tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,

    /// Emit structured JSON logs instead of the default human-readable
    /// format.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Tracing filter directive, e.g. "udpst_cli=debug,udpst_core=info".
    #[arg(long, global = true, default_value = "info")]
    pub log_filter: String,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Run as a server: listen for Setup Requests and serve test connections.
    Server(ServerArgs),
    /// Run as a client: connect to a server and run one measurement test.
    Client(ClientArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// Address to bind the control-port listener on; unspecified binds both
    /// families where the platform allows (`::` preferred, falling back to
    /// `0.0.0.0` on bind failure).
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Control port (`-x` in the reference binary).
    #[arg(short = 'x', long, default_value_t = udpst_core::config::DEF_CONTROL_PORT)]
    pub port: u16,

    /// Require every Setup Request to have jumbo datagrams enabled to match
    /// (`-j`).
    #[arg(short = 'j', long)]
    pub jumbo: bool,

    /// Require every Setup Request to enforce the traditional (1500-byte)
    /// Ethernet MTU to match (`-T`).
    #[arg(short = 'T', long)]
    pub traditional_mtu: bool,

    /// Shared authentication key (`-k`); when set, Setup Requests without a
    /// valid matching HMAC are rejected.
    #[arg(short = 'k', long)]
    pub auth_key: Option<String>,

    /// Require every Setup Request to be authenticated (`-A`, reused here as
    /// a boolean since the reference flag is presence-only).
    #[arg(long)]
    pub auth_required: bool,

    /// Upper bound on aggregate provisioned bandwidth in Mbps across all
    /// connections, 0 meaning unlimited (`-m`).
    #[arg(short = 'm', long, default_value_t = 0)]
    pub max_bandwidth_mbps: u32,

    /// Maximum concurrent test connections this server will admit.
    #[arg(long, default_value_t = udpst_core::config::MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Server's own ceiling on a negotiated test interval, in seconds
    /// (`-I`), independent of any per-request value.
    #[arg(short = 'I', long, default_value_t = udpst_core::config::MAX_TEST_INTERVAL_S)]
    pub max_test_interval_s: u16,

    /// Server's own ceiling on the IP ToS/DSCP byte it will honor from a
    /// client's activation request.
    #[arg(long, default_value_t = 255)]
    pub max_ip_tos_byte: u8,
}

#[derive(Parser, Debug, Clone)]
pub struct ClientArgs {
    /// Server host[:port] to connect to; a bare host uses the default
    /// control port.
    pub server: String,

    /// Send traffic upstream (client transmits, server receives) instead of
    /// the default downstream direction (`-u`).
    #[arg(short = 'u', long)]
    pub upstream: bool,

    /// Force IPv4 (`-4`).
    #[arg(short = '4', long)]
    pub ipv4: bool,

    /// Force IPv6 (`-6`).
    #[arg(short = '6', long)]
    pub ipv6: bool,

    /// Number of parallel test connections, `min[-max]` (`-C`); a bare
    /// number is both min and max.
    #[arg(short = 'C', long, default_value = "1")]
    pub connections: String,

    /// DSCP/ToS byte to request, decimal or `0x`-prefixed hex (`-D`).
    #[arg(short = 'D', long, value_parser = parse_byte, default_value = "0")]
    pub dscp: u8,

    /// Sending-rate table starting index: `=N` pins it for the whole test,
    /// `!N` only seeds the adaptive search's starting point, `auto` (the
    /// default) lets the server choose (`-i`).
    #[arg(short = 'i', long, default_value = "auto")]
    pub sr_index: String,

    /// Test duration in seconds (`-t`).
    #[arg(short = 't', long, default_value_t = udpst_core::config::DEF_TEST_INTERVAL_S)]
    pub test_interval_s: u16,

    /// Sub-interval reporting period in seconds (`-I`, read here as
    /// `sub-interval-period` to avoid colliding with the server's identical
    /// short flag reused for a different purpose upstream).
    #[arg(long, default_value_t = udpst_core::config::DEF_SUB_INTERVAL_PERIOD_S)]
    pub sub_interval_period_s: u8,

    /// Lower one-way-delay-variation/RTT threshold in ms (`-L`).
    #[arg(short = 'L', long, default_value_t = udpst_core::config::DEF_LOW_THRESH_MS)]
    pub low_thresh_ms: u32,

    /// Upper one-way-delay-variation/RTT threshold in ms (`-U`).
    #[arg(short = 'U', long, default_value_t = udpst_core::config::DEF_UPPER_THRESH_MS)]
    pub upper_thresh_ms: u32,

    /// Status-PDU trial interval in ms (`-P`).
    #[arg(short = 'P', long, default_value_t = udpst_core::config::DEF_TRIAL_INTERVAL_MS)]
    pub trial_interval_ms: u16,

    /// Consecutive bad/good cycles before a slow (as opposed to high-speed
    /// jump) rate adjustment applies (`-p`).
    #[arg(short = 'p', long, default_value_t = udpst_core::config::DEF_SLOW_ADJ_THRESHOLD)]
    pub slow_adjust_threshold: u16,

    /// Row-index jump size used while below the high-speed threshold
    /// (`-F`).
    #[arg(short = 'F', long, default_value_t = udpst_core::config::DEF_HIGH_SPEED_DELTA)]
    pub high_speed_delta: u8,

    /// Sequence errors per trial interval tolerated before a cycle is
    /// judged "bad" (`-c`).
    #[arg(short = 'c', long, default_value_t = udpst_core::config::DEF_SEQ_ERROR_THRESHOLD)]
    pub seq_error_threshold: u16,

    /// Bandwidth ceiling this test will request, in Mbps, 0 meaning
    /// unlimited (`-b`).
    #[arg(short = 'b', long, default_value_t = 0)]
    pub max_bandwidth_mbps: u32,

    /// Rate-adjustment algorithm: `b` (conservative) or `c` (fast ramp)
    /// (`-h`, read here as `algorithm`).
    #[arg(short = 'h', long, default_value = "b")]
    pub algorithm: String,

    /// Use round-trip time instead of one-way delay variation for the
    /// rate-adjustment feedback signal (`-o`; inverted here: one-way delay
    /// is udpst's literal default, so the flag name matches what it turns
    /// on).
    #[arg(short = 'o', long)]
    pub one_way_delay: bool,

    /// Ignore out-of-order and duplicate datagrams when computing sequence
    /// errors, counting only loss (`-R`).
    #[arg(short = 'R', long)]
    pub ignore_reorder: bool,

    /// Randomize per-datagram payload size within the active rate row's
    /// bounds (`-r`).
    #[arg(short = 'r', long)]
    pub random_payload: bool,

    /// Enable jumbo datagram sizes up to ~9000 bytes (`-j`).
    #[arg(short = 'j', long)]
    pub jumbo: bool,

    /// Enforce the traditional (1500-byte) Ethernet MTU (`-T`).
    #[arg(short = 'T', long)]
    pub traditional_mtu: bool,

    /// Shared authentication key to sign the Setup Request with (`-k`).
    #[arg(short = 'k', long)]
    pub auth_key: Option<String>,

    /// Print the final report as JSON instead of plain text (`-q`, read
    /// here as `json`).
    #[arg(short = 'q', long)]
    pub json: bool,

    /// Write a per-sub-interval CSV report to this path (`-E`); requires
    /// the `csv-export` feature.
    #[arg(short = 'E', long)]
    pub csv_path: Option<std::path::PathBuf>,

    /// Write one CSV row per received datagram (SeqNo, PayLoad, SrcTxTime,
    /// DstRxTime, OWD, IntfMbps, RTTTxTime, RTTRxTime, RTTRespDelay, RTT,
    /// StatusLoss) to this path; requires the `csv-export` feature. Distinct
    /// from `--csv-path`, which reports one row per sub-interval.
    #[arg(long)]
    pub datagram_csv_path: Option<std::path::PathBuf>,

    /// Network interface to sample for the `IntfMbps` column of
    /// `--datagram-csv-path` (e.g. `eth0`); ignored without that flag.
    #[arg(long)]
    pub datagram_csv_interface: Option<String>,
}

fn parse_byte(raw: &str) -> Result<u8, String> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        raw.parse::<u8>().map_err(|e| e.to_string())
    }
}

/// `connections` values: `"4"` -> `(4, 4)`, `"2-8"` -> `(2, 8)`.
pub fn parse_connection_range(raw: &str) -> Result<(u32, u32), String> {
    match raw.split_once('-') {
        Some((min, max)) => {
            let min: u32 = min.trim().parse().map_err(|_| format!("invalid connection minimum: {min}"))?;
            let max: u32 = max.trim().parse().map_err(|_| format!("invalid connection maximum: {max}"))?;
            if max < min {
                return Err(format!("connection maximum {max} is below minimum {min}"));
            }
            Ok((min, max))
        }
        None => {
            let n: u32 = raw.trim().parse().map_err(|_| format!("invalid connection count: {raw}"))?;
            Ok((n, n))
        }
    }
}

/// Resolved `sr-index` selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SrIndexSelection {
    pub sr_index_conf: u16,
    pub sr_index_is_start: bool,
}

/// `"auto"` -> server picks; `"=N"` -> pinned for the whole test; `"!N"` ->
/// only seeds the adaptive search's starting row.
pub fn parse_sr_index(raw: &str) -> Result<SrIndexSelection, String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("auto") {
        return Ok(SrIndexSelection { sr_index_conf: udpst_core::config::DEF_SR_INDEX_CONF, sr_index_is_start: false });
    }
    if let Some(rest) = trimmed.strip_prefix('=') {
        let n: u16 = rest.parse().map_err(|_| format!("invalid sr-index value: {rest}"))?;
        return Ok(SrIndexSelection { sr_index_conf: n, sr_index_is_start: false });
    }
    if let Some(rest) = trimmed.strip_prefix('!') {
        let n: u16 = rest.parse().map_err(|_| format!("invalid sr-index value: {rest}"))?;
        return Ok(SrIndexSelection { sr_index_conf: n, sr_index_is_start: true });
    }
    Err(format!("sr-index must be \"auto\", \"=N\", or \"!N\", got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_connection_count_is_both_min_and_max() {
        assert_eq!(parse_connection_range("4").unwrap(), (4, 4));
    }

    #[test]
    fn ranged_connection_count_splits_on_dash() {
        assert_eq!(parse_connection_range("2-8").unwrap(), (2, 8));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(parse_connection_range("8-2").is_err());
    }

    #[test]
    fn sr_index_auto_is_the_default_sentinel() {
        let sel = parse_sr_index("auto").unwrap();
        assert_eq!(sel.sr_index_conf, udpst_core::config::DEF_SR_INDEX_CONF);
        assert!(!sel.sr_index_is_start);
    }

    #[test]
    fn sr_index_pinned_form_disables_search() {
        let sel = parse_sr_index("=250").unwrap();
        assert_eq!(sel.sr_index_conf, 250);
        assert!(!sel.sr_index_is_start);
    }

    #[test]
    fn sr_index_starting_point_form_enables_search_from_n() {
        let sel = parse_sr_index("!12").unwrap();
        assert_eq!(sel.sr_index_conf, 12);
        assert!(sel.sr_index_is_start);
    }

    #[test]
    fn dscp_accepts_hex_and_decimal() {
        assert_eq!(parse_byte("0x2E").unwrap(), 0x2E);
        assert_eq!(parse_byte("46").unwrap(), 46);
    }
}
