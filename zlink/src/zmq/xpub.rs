//! XPUB (Extended Publisher) socket implementation.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use zlink_core::config::BufferConfig;
use zlink_core::monitor::SocketMonitor;
use zlink_core::options::SocketOptions;
use zlink_core::subscription::SubscriptionEvent;
use zlink_proto::xpub::XPubSocket as InternalXPub;
use zlink_proto::SocketType;

/// An XPUB socket: PUB with subscription events surfaced to the application.
///
/// Behaves exactly like [`crate::zmq::PubSocket`] on the send side, but
/// every SUBSCRIBE/CANCEL frame received from a peer is also surfaced via
/// [`Self::recv_subscription`] — useful for brokers that forward
/// subscriptions upstream or maintain a last-value cache.
///
/// ## Example
///
/// ```rust,no_run
/// use zlink::zmq::XPubSocket;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut socket = XPubSocket::bind("127.0.0.1:5555").await?;
/// if let Some(event) = socket.recv_subscription().await? {
///     println!("Subscription event: {:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub struct XPubSocket {
    inner: InternalXPub,
}

impl XPubSocket {
    /// Bind and start accepting subscriber connections with default options.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Ok(Self {
            inner: InternalXPub::bind(addr).await?,
        })
    }

    /// Bind with custom buffer configuration and socket options.
    pub async fn bind_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        Ok(Self {
            inner: InternalXPub::bind_with_options(addr, config, options).await?,
        })
    }

    /// Bind and accept `tls://` subscriber connections.
    pub async fn bind_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalXPub::bind_tls(addr, options).await?,
        })
    }

    /// Bind and accept `ws://` subscriber connections.
    pub async fn bind_ws(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalXPub::bind_ws(addr, options).await?,
        })
    }

    /// Bind and accept `wss://` subscriber connections.
    pub async fn bind_wss(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalXPub::bind_wss(addr, options).await?,
        })
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.inner.monitor()
    }

    /// Receive the next subscription event from any subscriber.
    pub async fn recv_subscription(&mut self) -> io::Result<Option<SubscriptionEvent>> {
        self.inner.recv_subscription().await
    }

    /// Broadcast a message; frame 0 is the topic used for prefix matching.
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
        SocketType::XPub
    }

    /// Get a reference to the socket options.
    #[inline]
    pub const fn options(&self) -> &SocketOptions {
        self.inner.options()
    }
}
