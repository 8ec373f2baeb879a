//! STREAM socket implementation.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use zlink_core::config::BufferConfig;
use zlink_core::monitor::SocketMonitor;
use zlink_core::options::SocketOptions;
use zlink_proto::stream::StreamSocket as InternalStream;
use zlink_proto::SocketType;

/// A STREAM socket for exchanging raw bytes with non-ZMP TCP peers.
///
/// Every accepted or connected peer is addressed by a routing id, the same
/// way ROUTER addresses its peers. A `[routing_id, 0x01]` message is
/// delivered when a peer connects and `[routing_id, 0x00]` when it
/// disconnects; all other received/sent frames are raw payload bytes with
/// no ZMP framing applied to the wire.
///
/// ## Example
///
/// ```rust,no_run
/// use zlink::zmq::StreamSocket;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut socket = StreamSocket::bind("127.0.0.1:5555").await?;
/// while let Some(msg) = socket.recv().await? {
///     let routing_id = msg[0].clone();
///     socket.send(vec![routing_id, msg[1].clone()]).await?; // Echo back
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamSocket {
    inner: InternalStream,
}

impl StreamSocket {
    /// Bind and start accepting raw TCP connections with default options.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::bind(addr).await?,
        })
    }

    /// Bind with custom socket options.
    pub async fn bind_with_options(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::bind_with_options(addr, BufferConfig::default(), options).await?,
        })
    }

    /// Bind and accept `tls://` peers.
    pub async fn bind_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::bind_tls(addr, options).await?,
        })
    }

    /// Bind and accept `ws://` peers.
    pub async fn bind_ws(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::bind_ws(addr, options).await?,
        })
    }

    /// Bind and accept `wss://` peers.
    pub async fn bind_wss(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::bind_wss(addr, options).await?,
        })
    }

    /// Connect to a raw TCP peer with default options.
    pub async fn connect(addr: &str) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::connect(addr).await?,
        })
    }

    /// Connect with custom socket options.
    pub async fn connect_with_options(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::connect_with_options(addr, BufferConfig::default(), options)
                .await?,
        })
    }

    /// Connect to a single peer over `tls://`.
    pub async fn connect_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::connect_tls(addr, options).await?,
        })
    }

    /// Connect to a single peer over `ws://`.
    pub async fn connect_ws(addr: &str, path: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::connect_ws(addr, path, options).await?,
        })
    }

    /// Connect to a single peer over `wss://`.
    pub async fn connect_wss(addr: &str, path: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalStream::connect_wss(addr, path, options).await?,
        })
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.inner.monitor()
    }

    /// Receive a message; first frame is the sender's routing id.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        self.inner.recv().await
    }

    /// Send a message; first frame must be the target peer's routing id.
    /// Unknown routing ids are silently dropped.
    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        self.inner.send(msg).await
    }

    /// Get the local address this socket is bound to, if bound.
    #[inline]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Stream
    }

    /// Get a reference to the socket options.
    #[inline]
    pub const fn options(&self) -> &SocketOptions {
        self.inner.options()
    }
}
