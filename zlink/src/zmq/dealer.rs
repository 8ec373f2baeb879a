//! DEALER socket implementation.

use bytes::Bytes;
use std::io;
use zlink_core::config::BufferConfig;
use zlink_core::monitor::SocketMonitor;
use zlink_core::options::SocketOptions;
use zlink_proto::dealer::DealerSocket as InternalDealer;
use zlink_proto::SocketType;

/// A DEALER socket for asynchronous, load-balanced message passing.
///
/// DEALER sockets fan out sends round-robin across every connected peer and
/// fair-queue receives from all of them. They're used for:
///
/// - Load-balanced request-reply
/// - Async RPC clients
/// - Worker pools
///
/// ## ZeroMQ Compatibility
///
/// Compatible with `zmq::DEALER` and `zmq::ROUTER` sockets from libzmq.
///
/// ## Example
///
/// ```rust,no_run
/// use zlink::zmq::DealerSocket;
/// use bytes::Bytes;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut socket = DealerSocket::connect("127.0.0.1:5555").await?;
/// socket.send(vec![Bytes::from("REQUEST")]).await?;
///
/// if let Some(reply) = socket.recv().await? {
///     println!("Got reply: {:?}", reply);
/// }
/// # Ok(())
/// # }
/// ```
pub struct DealerSocket {
    inner: InternalDealer,
}

impl DealerSocket {
    /// Connect to a single ROUTER/DEALER endpoint with default options.
    pub async fn connect(addr: &str) -> io::Result<Self> {
        Ok(Self {
            inner: InternalDealer::connect(addr).await?,
        })
    }

    /// Connect with a custom buffer configuration and socket options.
    pub async fn connect_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        Ok(Self {
            inner: InternalDealer::connect_with_options(addr, config, options).await?,
        })
    }

    /// Create a DEALER socket with no connections yet. Use [`Self::add_endpoint`]
    /// to connect to one or more peers — DEALER may fan out to many.
    #[must_use]
    pub fn new_unconnected(options: SocketOptions) -> Self {
        Self {
            inner: InternalDealer::new_unconnected(options),
        }
    }

    /// Connect to an additional peer; messages sent on this socket are
    /// round-robined across every connected peer.
    pub async fn add_endpoint(&self, addr: &str, config: BufferConfig) -> io::Result<()> {
        self.inner.add_endpoint(addr, config).await
    }

    /// Connect to an additional peer over `tls://`.
    pub async fn add_endpoint_tls(&self, addr: &str) -> io::Result<()> {
        self.inner.add_endpoint_tls(addr).await
    }

    /// Connect to an additional peer over `ws://`.
    pub async fn add_endpoint_ws(&self, addr: &str, path: &str) -> io::Result<()> {
        self.inner.add_endpoint_ws(addr, path).await
    }

    /// Connect to an additional peer over `wss://`.
    pub async fn add_endpoint_wss(&self, addr: &str, path: &str) -> io::Result<()> {
        self.inner.add_endpoint_wss(addr, path).await
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.inner.monitor()
    }

    /// Send a multipart message; the peer hub picks a connection via round
    /// robin.
    ///
    /// Fails with `ErrorKind::WouldBlock` once the picked peer's outbound
    /// queue is already at `send_hwm` capacity; a socket with no connected
    /// peers drops the message silently.
    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        self.inner.send(msg).await
    }

    /// Receive a multipart message, fair-queued from all connected peers.
    ///
    /// Returns `None` if every peer connection has closed.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        self.inner.recv().await
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Dealer
    }
}
