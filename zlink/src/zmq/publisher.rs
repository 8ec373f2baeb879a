//! PUB socket implementation.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use zlink_core::config::BufferConfig;
use zlink_core::monitor::SocketMonitor;
use zlink_core::options::SocketOptions;
use zlink_proto::publisher::PubSocket as InternalPub;
use zlink_proto::SocketType;

/// A PUB socket for broadcasting messages to every subscribed peer.
///
/// Every connected SUB/XSUB peer that has subscribed to a matching topic
/// prefix receives every published message. Fan-out and subscription
/// bookkeeping are owned by a background hub task; PUB itself is
/// send-only.
///
/// ## Example
///
/// ```rust,no_run
/// use zlink::zmq::PubSocket;
/// use bytes::Bytes;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let socket = PubSocket::bind("127.0.0.1:5555").await?;
///
/// // Frame 0 is the topic used for subscriber-side prefix matching.
/// socket.send(vec![Bytes::from("topic"), Bytes::from("data")]).await?;
/// # Ok(())
/// # }
/// ```
pub struct PubSocket {
    inner: InternalPub,
}

impl PubSocket {
    /// Bind and start accepting subscriber connections with default options.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPub::bind(addr).await?,
        })
    }

    /// Bind with custom buffer configuration and socket options.
    pub async fn bind_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPub::bind_with_options(addr, config, options).await?,
        })
    }

    /// Bind and accept `tls://` subscriber connections.
    pub async fn bind_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPub::bind_tls(addr, options).await?,
        })
    }

    /// Bind and accept `ws://` subscriber connections.
    pub async fn bind_ws(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPub::bind_ws(addr, options).await?,
        })
    }

    /// Bind and accept `wss://` subscriber connections.
    pub async fn bind_wss(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPub::bind_wss(addr, options).await?,
        })
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.inner.monitor()
    }

    /// Broadcast a multipart message to every subscriber whose subscription
    /// matches frame 0 (the topic).
    pub async fn send(&self, msg: Vec<Bytes>) -> io::Result<()> {
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
        SocketType::Pub
    }

    /// Get a reference to the socket options.
    #[inline]
    pub const fn options(&self) -> &SocketOptions {
        self.inner.options()
    }
}
