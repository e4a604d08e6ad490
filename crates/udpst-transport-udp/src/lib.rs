//! Non-blocking UDP transport used by the event loop (C4) and load generator
//! (C6).
//!
//! # Why
//! The measurement engine's hot path is "am I readable/writable right now,
//! and if so, drain or fill as many datagrams as I can without blocking" —
//! exactly the shape a cooperative single-threaded loop wants, and exactly
//! what `tokio::net::UdpSocket`'s `readable()`/`try_recv_from`/`writable()`/
//! `try_send_to` give without spawning a task per connection.
//!
//! # What
//! [`UdpEndpoint`] wraps one non-blocking UDP socket: creation via
//! `socket2::Socket` (for buffer-size and DSCP/ToS options not exposed by
//! `tokio::net::UdpSocket` directly), then conversion into a tokio socket.
//! [`batch`] holds the scatter-gather batched send/receive path.
//! [`ifcounter`] holds the pluggable interface byte-counter sampler.
//!
//! # How
//! Every connection owns its own `UdpEndpoint`, `connect()`-ed to its single
//! known remote so `send`/`recv` need no address bookkeeping, matching the
//! connection invariant that a `state=data` connection has exactly one
//! socket bound and connected to a known remote peer.

pub mod batch;
pub mod ifcounter;

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket setup failed: {0}")]
    Setup(#[source] io::Error),
    #[error("socket operation failed: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Options applied at socket construction time, before the socket is bound.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpSocketOptions {
    pub recv_buffer_bytes: Option<usize>,
    pub send_buffer_bytes: Option<usize>,
    /// IP_TOS / IPV6_TCLASS byte, applied immediately after bind.
    pub dscp: Option<u8>,
    pub reuse_address: bool,
}

#[cfg(feature = "runtime-tokio")]
pub struct UdpEndpoint {
    inner: tokio::net::UdpSocket,
}

#[cfg(feature = "runtime-tokio")]
impl UdpEndpoint {
    /// Binds a new endpoint on `local`, applying `opts` before the socket
    /// becomes visible to readers.
    pub fn bind(local: SocketAddr, opts: UdpSocketOptions) -> Result<Self, TransportError> {
        let domain = if local.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(TransportError::Setup)?;
        socket.set_nonblocking(true).map_err(TransportError::Setup)?;
        if opts.reuse_address {
            socket.set_reuse_address(true).map_err(TransportError::Setup)?;
        }
        if let Some(bytes) = opts.recv_buffer_bytes {
            socket.set_recv_buffer_size(bytes).map_err(TransportError::Setup)?;
        }
        if let Some(bytes) = opts.send_buffer_bytes {
            socket.set_send_buffer_size(bytes).map_err(TransportError::Setup)?;
        }
        socket.bind(&local.into()).map_err(TransportError::Setup)?;
        if let Some(tos) = opts.dscp {
            Self::apply_dscp(&socket, local.is_ipv6(), tos)?;
        }
        let std_socket: std::net::UdpSocket = socket.into();
        let inner = tokio::net::UdpSocket::from_std(std_socket).map_err(TransportError::Setup)?;
        Ok(Self { inner })
    }

    fn apply_dscp(socket: &Socket, ipv6: bool, tos: u8) -> Result<(), TransportError> {
        if ipv6 {
            socket.set_tclass_v6(tos as u32).map_err(TransportError::Setup)
        } else {
            socket.set_tos(tos as u32).map_err(TransportError::Setup)
        }
    }

    /// Re-applies the DSCP/ToS byte on an already-bound socket, used when a
    /// server clamps a client-requested value during Test Activation.
    pub fn set_dscp(&self, local_is_ipv6: bool, tos: u8) -> Result<(), TransportError> {
        let socket = socket2::SockRef::from(&self.inner);
        if local_is_ipv6 {
            socket.set_tclass_v6(tos as u32).map_err(TransportError::Setup)
        } else {
            socket.set_tos(tos as u32).map_err(TransportError::Setup)
        }
    }

    /// Connects the socket to its single remote peer; after this, `send`/
    /// `recv` (rather than `send_to`/`recv_from`) are used on the hot path.
    pub async fn connect(&self, remote: SocketAddr) -> io::Result<()> {
        self.inner.connect(remote).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub async fn readable(&self) -> io::Result<()> {
        self.inner.readable().await
    }

    pub async fn writable(&self) -> io::Result<()> {
        self.inner.writable().await
    }

    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.try_recv_from(buf)
    }

    pub fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.inner.try_send_to(buf, target)
    }

    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.try_recv(buf)
    }

    pub fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        self.inner.try_send(buf)
    }

    pub fn inner(&self) -> &tokio::net::UdpSocket {
        &self.inner
    }
}

#[cfg(all(test, feature = "runtime-tokio"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_loopback_round_trip() {
        let a = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap(), UdpSocketOptions::default()).unwrap();
        let b = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap(), UdpSocketOptions::default()).unwrap();
        let b_addr = b.local_addr().unwrap();

        a.try_send_to(b"hello", b_addr).unwrap();
        b.readable().await.unwrap();
        let mut buf = [0u8; 16];
        let (n, _from) = b.try_recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn dscp_round_trips_through_socket_option() {
        let endpoint = UdpEndpoint::bind(
            "127.0.0.1:0".parse().unwrap(),
            UdpSocketOptions { dscp: Some(0x2E << 2), ..Default::default() },
        )
        .unwrap();
        // Re-applying after bind must not error, mirroring the server's
        // "clamp, then apply" path during Test Activation.
        assert!(endpoint.set_dscp(false, 0x10).is_ok());
    }
}
