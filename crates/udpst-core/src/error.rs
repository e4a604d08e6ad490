use thiserror::Error;

/// Crate-wide error type. Propagated with `?`; the only place this crate
/// converts an error into something else is `udpst-cli`, which wraps it in
/// `anyhow::Error` at the binary edge.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Wire(#[from] udpst_wire::WireError),
    #[error(transparent)]
    RateTable(#[from] udpst_rate_table::RateTableError),
    #[error(transparent)]
    Transport(#[from] udpst_transport_udp::TransportError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("configuration rejected: {0}")]
    Config(String),
    #[error("connection table is full ({capacity} slots)")]
    ConnectionTableFull { capacity: usize },
    #[error("no connection in slot {0}")]
    NoSuchConnection(usize),
    #[error("server rejected setup: {0:?}")]
    SetupRejected(udpst_wire::SetupCmdResponse),
    #[error("server rejected test activation")]
    ActivationRejected,
    #[error("bandwidth budget exceeded: current {current} + requested {requested} > max {max}")]
    BandwidthBudgetExceeded { current: u32, requested: u32, max: u32 },
}
