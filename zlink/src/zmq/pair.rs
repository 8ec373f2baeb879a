//! PAIR socket implementation.

use bytes::Bytes;
use compio::net::TcpStream;
use std::io;
use zlink_core::config::BufferConfig;
use zlink_core::monitor::SocketMonitor;
use zlink_core::options::SocketOptions;
use zlink_proto::pair::PairSocket as InternalPair;
use zlink_proto::SocketType;

/// A PAIR socket for exclusive, bidirectional peer-to-peer communication.
///
/// PAIR sockets connect exactly two endpoints with no routing or filtering:
/// every sent message goes straight to the one connected peer.
///
/// ## Use Cases
///
/// - Connecting two threads in a process (via `inproc://`)
/// - Exclusive point-to-point links between two services
///
/// ## Example
///
/// ```rust,no_run
/// use zlink::zmq::PairSocket;
/// use bytes::Bytes;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (_listener, mut socket) = PairSocket::bind("127.0.0.1:5555").await?;
/// socket.send(vec![Bytes::from("hello")]).await?;
/// # Ok(())
/// # }
/// ```
pub struct PairSocket<S = TcpStream>
where
    S: compio::io::AsyncRead + compio::io::AsyncWrite + Unpin,
{
    inner: InternalPair<S>,
}

impl PairSocket {
    /// Bind to an address and accept the first connection.
    pub async fn bind(
        addr: impl compio::net::ToSocketAddrsAsync,
    ) -> io::Result<(compio::net::TcpListener, Self)> {
        let (listener, inner) = InternalPair::bind(addr).await?;
        Ok((listener, Self { inner }))
    }

    /// Connect to a remote PAIR socket.
    pub async fn connect(addr: impl compio::net::ToSocketAddrsAsync) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPair::connect(addr).await?,
        })
    }

    /// Create a PAIR socket from an existing TCP stream with TCP_NODELAY
    /// enabled.
    pub async fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPair::from_tcp(stream).await?,
        })
    }

    /// Create a PAIR socket from a TCP stream with custom buffer config and
    /// options.
    pub async fn from_tcp_with_options(
        stream: TcpStream,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPair::from_tcp_with_options(stream, config, options).await?,
        })
    }
}

impl PairSocket<zlink_proto::tls::TlsStream<TcpStream>> {
    /// Connect to a `tls://` endpoint.
    pub async fn connect_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPair::connect_tls(addr, options).await?,
        })
    }

    /// Bind to a `tls://` endpoint and accept the first connection.
    pub async fn bind_tls(
        addr: &str,
        options: SocketOptions,
    ) -> io::Result<(compio::net::TcpListener, Self)> {
        let (listener, inner) = InternalPair::bind_tls(addr, options).await?;
        Ok((listener, Self { inner }))
    }
}

impl PairSocket<zlink_proto::ws::WsStream<TcpStream>> {
    /// Connect to a `ws://` endpoint.
    pub async fn connect_ws(addr: &str, path: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPair::connect_ws(addr, path, options).await?,
        })
    }

    /// Bind to a `ws://` endpoint and accept the first connection.
    pub async fn bind_ws(
        addr: &str,
        options: SocketOptions,
    ) -> io::Result<(compio::net::TcpListener, Self)> {
        let (listener, inner) = InternalPair::bind_ws(addr, options).await?;
        Ok((listener, Self { inner }))
    }
}

impl PairSocket<zlink_proto::ws::WsStream<zlink_proto::tls::TlsStream<TcpStream>>> {
    /// Connect to a `wss://` endpoint.
    pub async fn connect_wss(addr: &str, path: &str, options: SocketOptions) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPair::connect_wss(addr, path, options).await?,
        })
    }

    /// Bind to a `wss://` endpoint and accept the first connection.
    pub async fn bind_wss(
        addr: &str,
        options: SocketOptions,
    ) -> io::Result<(compio::net::TcpListener, Self)> {
        let (listener, inner) = InternalPair::bind_wss(addr, options).await?;
        Ok((listener, Self { inner }))
    }
}

impl PairSocket<zlink_proto::inproc_stream::InprocStream> {
    /// Bind to an inproc endpoint (e.g. `"inproc://my-pair"`).
    pub fn bind_inproc(endpoint: &str) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPair::bind_inproc(endpoint)?,
        })
    }

    /// Connect to a previously bound inproc endpoint.
    pub fn connect_inproc(endpoint: &str) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPair::connect_inproc(endpoint)?,
        })
    }
}

impl<S> PairSocket<S>
where
    S: compio::io::AsyncRead + compio::io::AsyncWrite + Unpin,
{
    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.inner.monitor()
    }

    /// Send a message to the paired socket.
    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        self.inner.send(msg).await
    }

    /// Receive a message from the paired socket.
    ///
    /// Returns `Ok(None)` if the connection was closed.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        self.inner.recv().await
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub fn socket_type(&self) -> SocketType {
        self.inner.socket_type()
    }

    /// Get a reference to the socket options.
    #[inline]
    pub fn options(&self) -> &SocketOptions {
        self.inner.options()
    }
}
