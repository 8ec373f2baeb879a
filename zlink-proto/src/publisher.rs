//! PUB socket implementation.
//!
//! PUB is a send-only broadcast socket: every connected SUB/XSUB peer that
//! has subscribed to a matching topic prefix receives every published
//! message. Fan-out and subscription bookkeeping are owned by a single
//! [`zlink_core::pubsub::hub::PubSubHub`] task; each accepted connection
//! gets its own peer task that decodes SUBSCRIBE/CANCEL-flagged frames
//! (§4.2) into `PubSubEvent`s and forwards data frames from the hub to the
//! wire.

use bytes::Bytes;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::{TcpListener, TcpStream};
use flume::Sender;
use futures::FutureExt;
use std::io;
use std::net::SocketAddr;
use tracing::debug;

use zlink_core::config::BufferConfig;
use zlink_core::endpoint::Endpoint;
use zlink_core::monitor::{HandshakeFailure, SharedMonitor, SocketEvent, SocketMonitor};
use zlink_core::options::SocketOptions;
use zlink_core::pubsub::hub::{PubSubCmd, PubSubEvent, PubSubHub};
use zlink_core::router::{peer_channel, PeerCmd};
use zlink_core::socket_type::SocketType;

use crate::base::SocketBase;
use crate::codec::encode_multipart;
use crate::handshake::perform_handshake_with_timeout;
use crate::routing_id;
use crate::transport;

/// PUB socket: many-subscriber broadcast over TCP.
pub struct PubSocket {
    listener_addr: SocketAddr,
    cmd_tx: Sender<PubSubCmd>,
    options: SocketOptions,
    monitor: SharedMonitor,
    _accept_task: compio::runtime::Task<()>,
    _hub_task: compio::runtime::Task<()>,
}

impl PubSocket {
    /// Bind and start accepting subscriber connections with default options.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Self::bind_with_options(addr, BufferConfig::default(), SocketOptions::default()).await
    }

    /// Bind with custom buffer configuration and socket options.
    pub async fn bind_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let listener_addr = listener.local_addr()?;
        debug!("[PUB] Bound to {}", listener_addr);

        let (hub_tx, hub_rx) = flume::unbounded::<PubSubEvent>();
        let (user_tx, user_rx) = flume::unbounded::<PubSubCmd>();

        let hub = PubSubHub::new(hub_rx, user_rx);
        let hub_task = compio::runtime::spawn(hub.run());

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(Endpoint::Tcp(listener_addr)));

        let accept_task = compio::runtime::spawn(accept_loop(
            listener,
            options.clone(),
            config,
            hub_tx,
            SocketType::Pub,
            monitor.clone(),
        ));

        Ok(Self {
            listener_addr,
            cmd_tx: user_tx,
            options,
            monitor,
            _accept_task: accept_task,
            _hub_task: hub_task,
        })
    }

    /// Bind and accept `tls://` subscriber connections.
    pub async fn bind_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Self::bind_transport(addr, BufferConfig::default(), options, accept_loop_tls).await
    }

    /// Bind and accept `ws://` subscriber connections.
    pub async fn bind_ws(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Self::bind_transport(addr, BufferConfig::default(), options, accept_loop_ws).await
    }

    /// Bind and accept `wss://` subscriber connections.
    pub async fn bind_wss(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Self::bind_transport(addr, BufferConfig::default(), options, accept_loop_wss).await
    }

    async fn bind_transport<F, Fut>(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
        accept: F,
    ) -> io::Result<Self>
    where
        F: FnOnce(TcpListener, SocketOptions, BufferConfig, Sender<PubSubEvent>, SharedMonitor) -> Fut,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let listener_addr = listener.local_addr()?;
        debug!("[PUB] Bound to {}", listener_addr);

        let (hub_tx, hub_rx) = flume::unbounded::<PubSubEvent>();
        let (user_tx, user_rx) = flume::unbounded::<PubSubCmd>();

        let hub = PubSubHub::new(hub_rx, user_rx);
        let hub_task = compio::runtime::spawn(hub.run());

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(Endpoint::Tcp(listener_addr)));

        let accept_task = compio::runtime::spawn(accept(listener, options.clone(), config, hub_tx, monitor.clone()));

        Ok(Self {
            listener_addr,
            cmd_tx: user_tx,
            options,
            monitor,
            _accept_task: accept_task,
            _hub_task: hub_task,
        })
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.monitor.attach()
    }

    /// Broadcast a message; frame 0 is the topic used for prefix matching.
    pub async fn send(&self, msg: Vec<Bytes>) -> io::Result<()> {
        self.cmd_tx
            .send_async(PubSubCmd::Publish(msg))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pub hub closed"))
    }

    /// Get the local address this socket is bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.listener_addr
    }

    /// Get the socket type.
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Pub
    }

    /// Get a reference to the socket options.
    pub const fn options(&self) -> &SocketOptions {
        &self.options
    }
}

/// Shared accept loop used by PUB and (in verbose mode) XPUB: both sides
/// run subscriber connections through the same `PubSubHub`, differing only
/// in whether subscription events are also surfaced to the application
/// (handled by the caller wiring an extra forwarding step on `hub_tx`).
pub(crate) async fn accept_loop(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<PubSubEvent>,
    local_socket_type: SocketType,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[PUB] accept() failed: {}", e);
                continue;
            }
        };
        if zlink_core::tcp::enable_tcp_nodelay(&stream).is_err() {
            debug!(peer = %peer_addr, "[PUB] failed to enable TCP_NODELAY");
        }

        if !spawn_subscriber_peer(
            stream,
            peer_addr,
            local_socket_type,
            &options,
            &hub_tx,
            None,
            &monitor,
        )
        .await
        {
            break;
        }
    }
}

async fn accept_loop_tls(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<PubSubEvent>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[PUB] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_tls(stream, &options).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[PUB] TLS handshake failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::Auth,
                });
                continue;
            }
        };
        if !spawn_subscriber_peer(stream, peer_addr, SocketType::Pub, &options, &hub_tx, None, &monitor).await {
            break;
        }
    }
}

async fn accept_loop_ws(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<PubSubEvent>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[PUB] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_ws(stream).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[PUB] WS upgrade failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::NoDetail,
                });
                continue;
            }
        };
        if !spawn_subscriber_peer(stream, peer_addr, SocketType::Pub, &options, &hub_tx, None, &monitor).await {
            break;
        }
    }
}

async fn accept_loop_wss(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<PubSubEvent>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[PUB] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_wss(stream, &options).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[PUB] WSS upgrade failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::Auth,
                });
                continue;
            }
        };
        if !spawn_subscriber_peer(stream, peer_addr, SocketType::Pub, &options, &hub_tx, None, &monitor).await {
            break;
        }
    }
}

/// Complete the HELLO/READY handshake over an already-established stream,
/// register the new subscriber with the hub and spawn its peer task.
///
/// Shared by PUB and (via [`crate::xpub`]) XPUB accept loops, across every
/// transport variant; `app_tx` is `Some` only for XPUB, which additionally
/// surfaces subscription events to the application.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn spawn_subscriber_peer<S>(
    mut stream: S,
    peer_addr: SocketAddr,
    local_socket_type: SocketType,
    options: &SocketOptions,
    hub_tx: &Sender<PubSubEvent>,
    app_tx: Option<Sender<(Bytes, bool)>>,
    monitor: &SharedMonitor,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let endpoint = Endpoint::Tcp(peer_addr);
    monitor.emit(SocketEvent::ConnectionReady(endpoint.clone()));

    let handshake = perform_handshake_with_timeout(
        &mut stream,
        local_socket_type,
        Some(options.handshake_timeout),
    )
    .await;

    let Ok(handshake_result) = handshake else {
        debug!(peer = %peer_addr, "[PUB] handshake failed");
        monitor.emit(SocketEvent::HandshakeFailed {
            endpoint,
            reason: HandshakeFailure::Protocol,
        });
        return true;
    };

    let routing_id = routing_id::generate();
    debug!(
        peer = %peer_addr,
        peer_socket_type = %handshake_result.peer_socket_type,
        routing_id = ?routing_id,
        "[PUB] accepted subscriber"
    );
    monitor.emit(SocketEvent::Accepted(endpoint.clone()));
    monitor.emit(SocketEvent::Connected(endpoint.clone()));

    let base = SocketBase::new(stream, local_socket_type, options.clone());
    let (peer_cmd_tx, peer_cmd_rx) = peer_channel(options.send_hwm);
    let epoch = 1;

    if hub_tx
        .send(PubSubEvent::PeerUp {
            routing_id: routing_id.clone(),
            epoch,
            tx: peer_cmd_tx,
        })
        .is_err()
    {
        return false;
    }

    compio::runtime::spawn(run_subscriber_peer(
        base,
        routing_id,
        epoch,
        peer_cmd_rx,
        hub_tx.clone(),
        app_tx,
        endpoint,
        monitor.clone(),
    ))
    .detach();

    true
}

/// Drive one subscriber connection: apply inbound SUBSCRIBE/CANCEL frames to
/// the hub's index, forward outbound `PeerCmd::SendBody` publications to the
/// wire. If `app_tx` is set (XPUB), every subscription event is additionally
/// forwarded to the application so it can be surfaced from `recv()`.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_subscriber_peer<S>(
    mut base: SocketBase<S>,
    routing_id: Bytes,
    epoch: u64,
    cmd_rx: flume::Receiver<PeerCmd>,
    hub_tx: Sender<PubSubEvent>,
    app_tx: Option<Sender<(Bytes, bool)>>,
    endpoint: Endpoint,
    monitor: SharedMonitor,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let recv_fut = base.read_frame_with_heartbeat().fuse();
        let cmd_fut = cmd_rx.recv_async().fuse();
        futures::pin_mut!(recv_fut, cmd_fut);

        futures::select! {
            frame = recv_fut => {
                match frame {
                    Ok(Some(f)) if f.is_subscribe() || f.is_cancel() => {
                        let is_subscribe = f.is_subscribe();
                        let prefix = f.payload;
                        let event = if is_subscribe {
                            PubSubEvent::Subscribe { routing_id: routing_id.clone(), prefix: prefix.clone() }
                        } else {
                            PubSubEvent::Unsubscribe { routing_id: routing_id.clone(), prefix: prefix.clone() }
                        };
                        if hub_tx.send(event).is_err() {
                            break;
                        }
                        if let Some(ref app_tx) = app_tx {
                            let _ = app_tx.send_async((prefix, is_subscribe)).await;
                        }
                    }
                    Ok(Some(_)) => {
                        // PUB-family connections receive only SUBSCRIBE/CANCEL
                        // frames from their peer; anything else is ignored.
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            cmd = cmd_fut => {
                match cmd {
                    Ok(PeerCmd::SendBody(frames)) => {
                        base.write_buf.clear();
                        encode_multipart(&frames, &mut base.write_buf);
                        if base.write_from_buf().await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
        }
    }

    let _ = hub_tx.send(PubSubEvent::PeerDown { routing_id, epoch });
    monitor.emit(SocketEvent::Disconnected(endpoint));
}
