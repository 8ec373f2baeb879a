//! PAIR socket implementation
//!
//! PAIR sockets are exclusive peer-to-peer sockets that connect exactly two endpoints.
//! They provide bidirectional communication without routing or filtering.
//!
//! # Characteristics
//!
//! - **Exclusive**: Only connects to one peer at a time
//! - **Bidirectional**: Can both send and receive messages
//! - **No routing**: Messages go directly between the pair
//! - **No filtering**: All messages are delivered
//!
//! # Use Cases
//!
//! - Connecting two threads in a process
//! - Exclusive communication between two services
//! - Testing and prototyping

use crate::base::SocketBase;
use crate::codec::encode_multipart;
use crate::handshake::perform_handshake_with_timeout;
use crate::inproc_stream::InprocStream;
use crate::tls::TlsStream;
use crate::transport;
use crate::ws::WsStream;
use zlink_core::socket_type::SocketType;
use bytes::Bytes;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::TcpStream;
use zlink_core::config::BufferConfig;
use zlink_core::endpoint::Endpoint;
use zlink_core::monitor::{HandshakeFailure, SharedMonitor, SocketEvent, SocketMonitor};
use zlink_core::options::SocketOptions;
use smallvec::SmallVec;
use std::io;
use tracing::{debug, trace};

/// PAIR socket for exclusive peer-to-peer communication.
///
/// PAIR sockets connect exactly two endpoints and provide bidirectional
/// message passing without any routing or filtering logic.
pub struct PairSocket<S = TcpStream>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Base socket infrastructure (stream, buffers, options)
    base: SocketBase<S>,
    /// Accumulated frames for current multipart message
    frames: SmallVec<[Bytes; 4]>,
    /// Monitor sender; only emits once a labeled constructor (`connect`,
    /// `bind`, `*_inproc`, `connect_tls`, ...) established a known endpoint.
    monitor: SharedMonitor,
}

impl<S> PairSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new PAIR socket from a stream with default buffer configuration.
    pub async fn new(stream: S) -> io::Result<Self> {
        Self::with_options(stream, BufferConfig::default(), SocketOptions::default()).await
    }

    /// Create a new PAIR socket with custom buffer configuration.
    pub async fn with_config(stream: S, config: BufferConfig) -> io::Result<Self> {
        Self::with_options(stream, config, SocketOptions::default()).await
    }

    /// Create a new PAIR socket with custom buffer configuration and socket options.
    pub async fn with_options(
        stream: S,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        Self::with_options_and_endpoint(stream, config, options, None).await
    }

    /// Shared constructor body; `endpoint`, when known, wires up monitor
    /// emission for the handshake and later `recv` EOF/heartbeat-timeout.
    async fn with_options_and_endpoint(
        mut stream: S,
        config: BufferConfig,
        options: SocketOptions,
        endpoint: Option<Endpoint>,
    ) -> io::Result<Self> {
        debug!("[PAIR] Creating new PAIR socket");
        let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
        let monitor = SharedMonitor::none();
        if let Some(ep) = &endpoint {
            monitor.emit(SocketEvent::ConnectionReady(ep.clone()));
        }

        debug!("[PAIR] Performing HELLO/READY handshake...");
        let handshake_result = perform_handshake_with_timeout(
            &mut stream,
            SocketType::Pair,
            Some(options.handshake_timeout),
        )
        .await
        .map_err(|e| {
            if let Some(ep) = &endpoint {
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: ep.clone(),
                    reason: HandshakeFailure::Protocol,
                });
            }
            io::Error::other(format!("Handshake failed: {}", e))
        })?;

        debug!(
            peer_socket_type = %handshake_result.peer_socket_type,
            "[PAIR] Handshake complete"
        );
        if let Some(ep) = &endpoint {
            monitor.emit(SocketEvent::Connected(ep.clone()));
        }

        debug!("[PAIR] Socket initialized");

        let base = match endpoint {
            Some(ep) => SocketBase::with_endpoint(stream, SocketType::Pair, ep, options),
            None => SocketBase::new(stream, SocketType::Pair, options),
        };

        Ok(Self {
            base,
            frames: SmallVec::new(),
            monitor,
        })
    }

    /// Attach a monitor channel to receive lifecycle events for this socket.
    ///
    /// Events emitted before the first call to `monitor()` are not
    /// buffered; call this before `connect`/`bind` if you need to observe
    /// every transition. Sockets built from a raw stream via `new`/
    /// `with_config`/`with_options` have no known endpoint and never emit.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.monitor.attach()
    }

    /// Send a message to the paired socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is poisoned, disconnected, or if the write fails.
    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        trace!("[PAIR] Sending {} frames", msg.len());

        // Encode message into write_buf
        self.base.write_buf.clear();
        encode_multipart(&msg, &mut self.base.write_buf);

        // Delegate to base for writing
        self.base.write_from_buf().await?;

        trace!("[PAIR] Message sent successfully");
        Ok(())
    }

    /// Receive a message from the paired socket.
    ///
    /// Returns `Ok(Some(msg))` if a message was received, `Ok(None)` if the
    /// connection was closed, or an error.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        trace!("[PAIR] Waiting for message");

        loop {
            match self.base.read_frame_with_heartbeat().await {
                Ok(Some(frame)) => {
                    let more = frame.more();
                    self.frames.push(frame.payload);

                    if !more {
                        let msg: Vec<Bytes> = self.frames.drain(..).collect();
                        trace!("[PAIR] Received {} frames", msg.len());
                        return Ok(Some(msg));
                    }
                }
                Ok(None) => {
                    trace!("[PAIR] Connection closed");
                    if let Some(ep) = self.base.last_endpoint().cloned() {
                        self.monitor.emit(SocketEvent::Disconnected(ep));
                    }
                    return Ok(None);
                }
                Err(e) => {
                    if let Some(ep) = self.base.last_endpoint().cloned() {
                        self.monitor.emit(SocketEvent::Disconnected(ep));
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Close the socket gracefully.
    pub async fn close(self) -> io::Result<()> {
        trace!("[PAIR] Closing socket");
        Ok(())
    }

    /// Get a reference to the socket options.
    #[inline]
    pub fn options(&self) -> &SocketOptions {
        &self.base.options
    }

    /// Get a mutable reference to the socket options.
    #[inline]
    pub fn options_mut(&mut self) -> &mut SocketOptions {
        &mut self.base.options
    }

    /// Set socket options (builder-style).
    #[inline]
    pub fn set_options(&mut self, options: SocketOptions) {
        self.base.options = options;
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub fn socket_type(&self) -> SocketType {
        SocketType::Pair
    }

    /// Get the endpoint this socket is connected/bound to, if available.
    ///
    /// Returns `None` if the socket was created from a raw stream.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_LAST_ENDPOINT` (32) option.
    #[inline]
    pub fn last_endpoint(&self) -> Option<&Endpoint> {
        self.base.last_endpoint()
    }

    /// Check if the last received message has more frames coming.
    ///
    /// Returns `true` if there are more frames in the current multipart message.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_RCVMORE` (13) option.
    #[inline]
    pub fn has_more(&self) -> bool {
        self.base.has_more()
    }

    /// Get the event state of the socket.
    ///
    /// Returns a bitmask indicating ready-to-receive and ready-to-send states.
    ///
    /// # Returns
    ///
    /// - `1` (POLLIN) - Socket is ready to receive
    /// - `2` (POLLOUT) - Socket is ready to send
    /// - `3` (POLLIN | POLLOUT) - Socket is ready for both
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_EVENTS` (15) option.
    #[inline]
    pub fn events(&self) -> u32 {
        self.base.events()
    }
}

// Specialized implementation for TCP streams to enable TCP_NODELAY
impl PairSocket<TcpStream> {
    /// Bind to an address and accept the first connection.
    ///
    /// PAIR sockets form an exclusive pair with exactly one peer.
    ///
    /// # Returns
    ///
    /// A tuple of `(listener, socket)` where:
    /// - `listener` can be used to accept additional connections if needed
    /// - `socket` is ready to send/receive with the first peer
    ///
    /// # Example
    ///
    /// ```no_run
    /// use zlink_proto::pair::PairSocket;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let (listener, mut socket) = PairSocket::bind("127.0.0.1:5555").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bind(
        addr: impl compio::net::ToSocketAddrsAsync,
    ) -> io::Result<(compio::net::TcpListener, Self)> {
        let listener = compio::net::TcpListener::bind(addr).await?;
        let (stream, _) = listener.accept().await?;
        let socket = Self::from_tcp(stream).await?;
        Ok((listener, socket))
    }

    /// Connect to a remote PAIR socket.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use zlink_proto::pair::PairSocket;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut socket = PairSocket::connect("127.0.0.1:5555").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(
        addr: impl compio::net::ToSocketAddrsAsync,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_tcp(stream).await
    }

    /// Create a new PAIR socket from a TCP stream with TCP_NODELAY enabled.
    pub async fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        Self::from_tcp_with_config(stream, BufferConfig::default()).await
    }

    /// Create a new PAIR socket from a TCP stream with TCP_NODELAY and custom config.
    pub async fn from_tcp_with_config(
        stream: TcpStream,
        config: BufferConfig,
    ) -> io::Result<Self> {
        Self::from_tcp_with_options(stream, config, SocketOptions::default()).await
    }

    /// Create a new PAIR socket from a TCP stream with TCP_NODELAY and custom options.
    pub async fn from_tcp_with_options(
        stream: TcpStream,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        // Enable TCP_NODELAY for low latency
        zlink_core::tcp::enable_tcp_nodelay(&stream)?;
        debug!("[PAIR] TCP_NODELAY enabled");
        let endpoint = stream.peer_addr().ok().map(Endpoint::Tcp);
        Self::with_options_and_endpoint(stream, config, options, endpoint).await
    }
}

// Specialized implementation for Inproc streams
impl PairSocket<InprocStream> {
    /// Bind to an inproc endpoint.
    ///
    /// Creates a new inproc endpoint that other sockets can connect to.
    /// Inproc endpoints must be bound before they can be connected to.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Inproc URI (e.g., "inproc://my-endpoint")
    ///
    /// # Example
    ///
    /// ```no_run
    /// use zlink_proto::pair::PairSocket;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let socket = PairSocket::bind_inproc("inproc://my-pair")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn bind_inproc(endpoint: &str) -> io::Result<Self> {
        Self::bind_inproc_with_options(endpoint, BufferConfig::default(), SocketOptions::default())
    }

    /// Bind to an inproc endpoint with custom configuration and options.
    pub fn bind_inproc_with_options(
        endpoint: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        debug!("[PAIR] Binding to inproc endpoint: {}", endpoint);
        let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);

        // Bind to inproc endpoint
        let (tx, rx) = zlink_core::inproc::bind_inproc(endpoint)?;
        let stream = InprocStream::new(tx, rx);

        // Parse endpoint for storage
        let parsed_endpoint = Endpoint::parse(endpoint)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        debug!("[PAIR] Bound to {}", endpoint);

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(parsed_endpoint.clone()));
        monitor.emit(SocketEvent::ConnectionReady(parsed_endpoint.clone()));
        monitor.emit(SocketEvent::Connected(parsed_endpoint.clone()));

        // For inproc, no handshake needed (same process)
        Ok(Self {
            base: SocketBase::with_endpoint(stream, SocketType::Pair, parsed_endpoint, options),
            frames: SmallVec::new(),
            monitor,
        })
    }

    /// Connect to an inproc endpoint.
    ///
    /// Connects to a previously bound inproc endpoint.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Inproc URI (e.g., "inproc://my-endpoint")
    ///
    /// # Example
    ///
    /// ```no_run
    /// use zlink_proto::pair::PairSocket;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let socket = PairSocket::connect_inproc("inproc://my-pair")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect_inproc(endpoint: &str) -> io::Result<Self> {
        Self::connect_inproc_with_options(endpoint, BufferConfig::default(), SocketOptions::default())
    }

    /// Connect to an inproc endpoint with custom configuration and options.
    pub fn connect_inproc_with_options(
        endpoint: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        debug!("[PAIR] Connecting to inproc endpoint: {}", endpoint);
        let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);

        // Connect to inproc endpoint
        let tx = zlink_core::inproc::connect_inproc(endpoint)?;
        
        // For inproc, we need to create a receiver channel
        // The sender sends to the bound endpoint, we receive on our own channel
        let (our_tx, our_rx) = flume::unbounded();
        
        // Register our receiver with the sender
        // This is a bit tricky - we need bidirectional communication
        // For now, create a stream with the connection sender and a new receiver
        let stream = InprocStream::new(tx, our_rx);

        // Parse endpoint for storage
        let parsed_endpoint = Endpoint::parse(endpoint)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        debug!("[PAIR] Connected to {}", endpoint);

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::ConnectionReady(parsed_endpoint.clone()));
        monitor.emit(SocketEvent::Connected(parsed_endpoint.clone()));

        // For inproc, no handshake needed (same process)
        Ok(Self {
            base: SocketBase::with_endpoint(stream, SocketType::Pair, parsed_endpoint, options),
            frames: SmallVec::new(),
            monitor,
        })
    }
}

// TLS transport (`tls://`): the stream is already handshaked by the time
// `with_options` runs its HELLO/READY exchange over it.
impl PairSocket<TlsStream<TcpStream>> {
    /// Connect to a `tls://` endpoint.
    pub async fn connect_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        let stream = transport::connect_tls(addr, &options).await?;
        let endpoint = addr.parse().ok().map(Endpoint::Tls);
        Self::with_options_and_endpoint(stream, BufferConfig::default(), options, endpoint).await
    }

    /// Bind to a `tls://` endpoint and accept the first connection.
    pub async fn bind_tls(
        addr: &str,
        options: SocketOptions,
    ) -> io::Result<(compio::net::TcpListener, Self)> {
        let listener = compio::net::TcpListener::bind(addr).await?;
        let (tcp, peer_addr) = listener.accept().await?;
        let stream = transport::accept_tls(tcp, &options).await?;
        let socket = Self::with_options_and_endpoint(
            stream,
            BufferConfig::default(),
            options,
            Some(Endpoint::Tls(peer_addr)),
        )
        .await?;
        Ok((listener, socket))
    }
}

// WebSocket transport (`ws://`).
impl PairSocket<WsStream<TcpStream>> {
    /// Connect to a `ws://` endpoint.
    pub async fn connect_ws(addr: &str, path: &str, options: SocketOptions) -> io::Result<Self> {
        let stream = transport::connect_ws(addr, path).await?;
        let endpoint = addr.parse().ok().map(|a| Endpoint::Ws {
            addr: a,
            path: path.to_string(),
        });
        Self::with_options_and_endpoint(stream, BufferConfig::default(), options, endpoint).await
    }

    /// Bind to a `ws://` endpoint and accept the first connection.
    pub async fn bind_ws(
        addr: &str,
        options: SocketOptions,
    ) -> io::Result<(compio::net::TcpListener, Self)> {
        let listener = compio::net::TcpListener::bind(addr).await?;
        let (tcp, peer_addr) = listener.accept().await?;
        let stream = transport::accept_ws(tcp).await?;
        let endpoint = Endpoint::Ws {
            addr: peer_addr,
            path: String::new(),
        };
        let socket = Self::with_options_and_endpoint(
            stream,
            BufferConfig::default(),
            options,
            Some(endpoint),
        )
        .await?;
        Ok((listener, socket))
    }
}

// WebSocket-over-TLS transport (`wss://`).
impl PairSocket<WsStream<TlsStream<TcpStream>>> {
    /// Connect to a `wss://` endpoint.
    pub async fn connect_wss(addr: &str, path: &str, options: SocketOptions) -> io::Result<Self> {
        let stream = transport::connect_wss(addr, path, &options).await?;
        let endpoint = addr.parse().ok().map(|a| Endpoint::Wss {
            addr: a,
            path: path.to_string(),
        });
        Self::with_options_and_endpoint(stream, BufferConfig::default(), options, endpoint).await
    }

    /// Bind to a `wss://` endpoint and accept the first connection.
    pub async fn bind_wss(
        addr: &str,
        options: SocketOptions,
    ) -> io::Result<(compio::net::TcpListener, Self)> {
        let listener = compio::net::TcpListener::bind(addr).await?;
        let (tcp, peer_addr) = listener.accept().await?;
        let stream = transport::accept_wss(tcp, &options).await?;
        let endpoint = Endpoint::Wss {
            addr: peer_addr,
            path: String::new(),
        };
        let socket = Self::with_options_and_endpoint(
            stream,
            BufferConfig::default(),
            options,
            Some(endpoint),
        )
        .await?;
        Ok((listener, socket))
    }
}

crate::impl_socket_trait!(PairSocket<S>, SocketType::Pair);
