//! SUB socket implementation.

use bytes::Bytes;
use std::io;
use zlink_core::config::BufferConfig;
use zlink_core::monitor::SocketMonitor;
use zlink_core::options::SocketOptions;
use zlink_proto::subscriber::SubSocket as InternalSub;
use zlink_proto::SocketType;

/// A SUB socket for receiving topic-filtered messages.
///
/// SUB sockets fan in from one or more PUB/XPUB peers; subscriptions are
/// tracked locally so a late-joining connection can be caught up, and are
/// also forwarded upstream so the publisher only sends topics someone
/// actually wants.
///
/// ## ZeroMQ Compatibility
///
/// Compatible with `zmq::SUB` and `zmq::PUB`/`zmq::XPUB` peers from libzmq.
///
/// ## Example
///
/// ```rust,no_run
/// use zlink::zmq::SubSocket;
/// use zlink::SocketOptions;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let socket = SubSocket::new(SocketOptions::default());
/// socket.subscribe(b"topic".to_vec());
/// socket.connect("127.0.0.1:5555").await?;
///
/// # let mut socket = socket;
/// while let Some(msg) = socket.recv().await? {
///     println!("Received: {:?}", msg);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SubSocket {
    inner: InternalSub,
}

impl SubSocket {
    /// Create a SUB socket with no connections yet.
    #[must_use]
    pub fn new(options: SocketOptions) -> Self {
        Self {
            inner: InternalSub::new(options),
        }
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.inner.monitor()
    }

    /// Connect to a publisher with default buffer configuration.
    ///
    /// Accepts TCP endpoints or raw socket addresses:
    /// - `"tcp://127.0.0.1:5555"`
    /// - `"127.0.0.1:5555"`
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

    /// Subscribe to messages with the given prefix (empty = all).
    pub fn subscribe(&self, prefix: impl Into<Bytes>) {
        self.inner.subscribe(prefix);
    }

    /// Unsubscribe from messages with the given prefix.
    pub fn unsubscribe(&self, prefix: impl Into<Bytes>) {
        self.inner.unsubscribe(prefix);
    }

    /// Receive the next message matching an active subscription.
    ///
    /// Returns `None` once every publisher connection has closed.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        self.inner.recv().await
    }

    /// Number of active subscriptions.
    #[inline]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscription_count()
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Sub
    }
}
