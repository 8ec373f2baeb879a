//! XSUB (Extended Subscriber) socket implementation.

use bytes::Bytes;
use std::io;
use zlink_core::config::BufferConfig;
use zlink_core::monitor::SocketMonitor;
use zlink_core::options::SocketOptions;
use zlink_core::subscription::SubscriptionEvent;
use zlink_proto::xsub::XSubSocket as InternalXSub;
use zlink_proto::SocketType;

/// An XSUB socket: fan-in counterpart to [`crate::zmq::XPubSocket`].
///
/// Forwards explicit SUBSCRIBE/CANCEL-flagged frames upstream instead of
/// filtering locally, letting brokers relay subscriptions between a frontend
/// XSUB and a backend XPUB without decoding message bodies.
///
/// ## Example
///
/// ```rust,no_run
/// use zlink::zmq::XSubSocket;
/// use zlink::SocketOptions;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let socket = XSubSocket::new(SocketOptions::default());
/// socket.subscribe(b"topic".to_vec());
/// socket.connect("127.0.0.1:5555").await?;
/// # Ok(())
/// # }
/// ```
pub struct XSubSocket {
    inner: InternalXSub,
}

impl XSubSocket {
    /// Create an XSUB socket with no connections yet.
    #[must_use]
    pub fn new(options: SocketOptions) -> Self {
        Self {
            inner: InternalXSub::new(options),
        }
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.inner.monitor()
    }

    /// Connect to a publisher with default buffer configuration.
    pub async fn connect(&self, addr: &str) -> io::Result<()> {
        self.inner.connect(addr).await
    }

    /// Connect to an additional publisher with custom buffer configuration;
    /// existing subscriptions are replayed to the new connection
    /// immediately.
    pub async fn connect_with_config(&self, addr: &str, config: BufferConfig) -> io::Result<()> {
        self.inner.connect_with_config(addr, config).await
    }

    /// Connect to a publisher over `tls://`.
    pub async fn connect_tls(&self, addr: &str) -> io::Result<()> {
        self.inner.connect_tls(addr).await
    }

    /// Connect to a publisher over `ws://`.
    pub async fn connect_ws(&self, addr: &str, path: &str) -> io::Result<()> {
        self.inner.connect_ws(addr, path).await
    }

    /// Connect to a publisher over `wss://`.
    pub async fn connect_wss(&self, addr: &str, path: &str) -> io::Result<()> {
        self.inner.connect_wss(addr, path).await
    }

    /// Subscribe to messages with the given prefix (empty = all); forwards a
    /// SUBSCRIBE frame to every connected publisher.
    pub fn subscribe(&self, prefix: impl Into<Bytes>) {
        self.inner.subscribe(prefix);
    }

    /// Unsubscribe from messages with the given prefix; forwards a CANCEL
    /// frame to every connected publisher.
    pub fn unsubscribe(&self, prefix: impl Into<Bytes>) {
        self.inner.unsubscribe(prefix);
    }

    /// Forward a raw subscription event upstream without touching local
    /// subscription bookkeeping — used by proxies relaying a downstream
    /// XPUB's subscription events to an upstream publisher.
    pub fn send_subscription_event(&self, event: &SubscriptionEvent) {
        self.inner.send_subscription_event(event);
    }

    /// Receive the next data message.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        self.inner.recv().await
    }

    /// Number of active subscriptions.
    #[inline]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscription_count()
    }

    /// Check if subscribed to a specific topic.
    #[inline]
    pub fn is_subscribed(&self, topic: &[u8]) -> bool {
        self.inner.is_subscribed(topic)
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub const fn socket_type(&self) -> SocketType {
        SocketType::XSub
    }
}
