//! UDP transport collaborator
//!
//! The engine only needs two primitives: send bytes to an endpoint with a
//! broadcast toggle, and a cancellable blocking receive. [`Transport`]
//! abstracts those so tests can substitute an in-memory fake; the real
//! implementation wraps a tokio [`UdpSocket`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::UdpSocket;

/// Datagram transport contract
///
/// No assumptions about reliability or ordering beyond what UDP provides.
pub trait Transport: Send + Sync + 'static {
    /// Send one datagram. `broadcast` is applied consistently with this
    /// call — never toggled concurrently with an unrelated send.
    fn send(
        &self,
        target: SocketAddr,
        payload: &[u8],
        broadcast: bool,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// Receive one datagram. Cancel-safe: dropping the future (e.g. from
    /// a `select!` against a stop signal) loses no state.
    fn recv(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;
}

/// Real UDP transport over a shared socket
///
/// The single-send and periodic-send paths share this socket; the send
/// mutex serializes the broadcast-flag change with the send it pairs
/// with.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    send_lock: tokio::sync::Mutex<()>,
    /// Last broadcast flag applied to the socket, to skip the redundant
    /// setsockopt on every send
    broadcast: AtomicBool,
}

impl UdpTransport {
    /// Bind to a local address. Port 0 picks an ephemeral port.
    pub async fn bind(local: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        tracing::info!(local = %socket.local_addr()?, "transport bound");
        Ok(Self {
            socket,
            send_lock: tokio::sync::Mutex::new(()),
            broadcast: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    async fn send(&self, target: SocketAddr, payload: &[u8], broadcast: bool) -> io::Result<usize> {
        let _guard = self.send_lock.lock().await;
        if self.broadcast.load(Ordering::Relaxed) != broadcast {
            self.socket.set_broadcast(broadcast)?;
            self.broadcast.store(broadcast, Ordering::Relaxed);
        }
        self.socket.send_to(payload, target).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}
