//! ROUTER socket implementation.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use zlink_core::config::BufferConfig;
use zlink_core::monitor::SocketMonitor;
use zlink_core::options::SocketOptions;
use zlink_proto::router::RouterSocket as InternalRouter;
use zlink_proto::SocketType;

/// A ROUTER socket for identity-based routing.
///
/// ROUTER accepts connections from many peers (DEALER, ROUTER, STREAM) and
/// addresses each of them by a routing id: receiving a message prepends
/// exactly the sender's routing id as a MORE frame, and sending one routes
/// to whichever peer presents that id, or drops silently if it's unknown —
/// unless `ZMQ_ROUTER_MANDATORY` is set via [`SocketOptions`].
///
/// ## ZeroMQ Compatibility
///
/// Compatible with `zmq::ROUTER` and `zmq::DEALER`/`zmq::STREAM` peers from
/// libzmq.
///
/// ## Message Format
///
/// **Incoming**: `[routing_id, ...user_frames]`\
/// **Outgoing**: `[routing_id, ...user_frames]` (routed to the peer with
/// that id)
///
/// ## Example
///
/// ```rust,no_run
/// use zlink::zmq::RouterSocket;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut socket = RouterSocket::bind("127.0.0.1:5555").await?;
///
/// // Echo server
/// while let Some(msg) = socket.recv().await? {
///     socket.send(msg).await?; // Echo back to sender
/// }
/// # Ok(())
/// # }
/// ```
pub struct RouterSocket {
    inner: InternalRouter,
}

impl RouterSocket {
    /// Bind and start accepting connections with default options.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Ok(Self {
            inner: InternalRouter::bind(addr).await?,
        })
    }

    /// Bind with custom buffer configuration and socket options.
    pub async fn bind_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        Ok(Self {
            inner: InternalRouter::bind_with_options(addr, config, options).await?,
        })
    }

    /// Bind and accept `tls://` connections.
    pub async fn bind_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalRouter::bind_tls(addr, options).await?,
        })
    }

    /// Bind and accept `ws://` connections.
    pub async fn bind_ws(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalRouter::bind_ws(addr, options).await?,
        })
    }

    /// Bind and accept `wss://` connections.
    pub async fn bind_wss(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalRouter::bind_wss(addr, options).await?,
        })
    }

    /// Enable monitoring for this socket; returns a receiver for socket
    /// lifecycle events (accepted connections, etc.).
    pub fn monitor(&mut self) -> SocketMonitor {
        self.inner.monitor()
    }

    /// Receive a message; first frame is the sender's routing id, followed
    /// by the message body.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        self.inner.recv().await
    }

    /// Send a message; expects `[routing_id, body...]`.
    ///
    /// With `router_mandatory` unset (the default), an unknown routing id is
    /// silently dropped. With `router_mandatory` set, the send fails with
    /// `ErrorKind::NotFound` instead.
    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        self.inner.send(msg).await
    }

    /// Get the local address this socket is bound to.
    #[inline]
    pub const fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Router
    }

    /// Get a reference to the socket options.
    #[inline]
    pub const fn options(&self) -> &SocketOptions {
        self.inner.options()
    }
}
