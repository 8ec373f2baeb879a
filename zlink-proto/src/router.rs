//! ROUTER socket implementation.
//!
//! ROUTER accepts connections from many peers (DEALER, ROUTER, STREAM) and
//! exposes each of them as an addressable routing id. Receiving a message
//! prepends exactly the sender's routing id as a MORE frame; sending one
//! expects the same `[routing_id, body...]` envelope and is routed to the
//! matching peer, or silently dropped if the id is unknown (matches
//! libzmq's ROUTER semantics).
//!
//! # Architecture
//!
//! One [`RouterHub`] runs as a background task and owns the routing table.
//! Each accepted connection gets its own peer task (spawned by the accept
//! loop) that drives `SocketBase` I/O and exchanges `PeerCmd`/`HubEvent`
//! with the hub over `flume` channels — no locks on the hot path.

use bytes::Bytes;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::{TcpListener, TcpStream};
use flume::{Receiver, Sender};
use futures::FutureExt;
use smallvec::SmallVec;
use std::io;
use std::net::SocketAddr;
use tracing::{debug, trace};

use zlink_core::config::BufferConfig;
use zlink_core::endpoint::Endpoint;
use zlink_core::monitor::{HandshakeFailure, SharedMonitor, SocketEvent, SocketMonitor};
use zlink_core::options::SocketOptions;
use zlink_core::router::{
    peer_channel, HubEvent, PeerCmd, RouterBehavior, RouterCmd, RouterHub, SendOutcome,
};
use zlink_core::socket_type::SocketType;

use crate::base::SocketBase;
use crate::codec::encode_multipart;
use crate::handshake::perform_handshake_with_timeout;
use crate::routing_id;
use crate::transport;

/// Drive one peer connection until it disconnects, bridging `SocketBase` I/O
/// with the owning hub's `PeerCmd`/`HubEvent` channels.
///
/// Shared by ROUTER, DEALER and STREAM: all three are `RouterHub` clients
/// that differ only in `RouterBehavior` and in how the envelope tag
/// (`routing_id`) is surfaced to the application on the recv path.
pub(crate) async fn run_peer<S>(
    mut base: SocketBase<S>,
    routing_id: Bytes,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    cmd_rx: Receiver<PeerCmd>,
    hub_tx: Sender<HubEvent>,
    endpoint: Endpoint,
    monitor: SharedMonitor,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let recv_fut = recv_multipart(&mut base).fuse();
        let cmd_fut = cmd_rx.recv_async().fuse();
        futures::pin_mut!(recv_fut, cmd_fut);

        futures::select! {
            msg = recv_fut => {
                match msg {
                    Ok(Some(frames)) => {
                        if inbound_tx.send_async((routing_id.clone(), frames)).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
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

    trace!(routing_id = ?routing_id, "[ROUTER] peer task exiting");
    monitor.emit(SocketEvent::Disconnected(endpoint));
    let _ = hub_tx.send(HubEvent::PeerDown { routing_id });
}

pub(crate) async fn recv_multipart<S>(base: &mut SocketBase<S>) -> io::Result<Option<Vec<Bytes>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frames: SmallVec<[Bytes; 4]> = SmallVec::new();
    loop {
        match base.read_frame_with_heartbeat().await? {
            Some(frame) => {
                let more = frame.more();
                frames.push(frame.payload);
                if !more {
                    return Ok(Some(frames.into_vec()));
                }
            }
            None => return Ok(None),
        }
    }
}

/// ROUTER socket: many-peer, identity-addressed routing over TCP.
pub struct RouterSocket {
    listener_addr: SocketAddr,
    cmd_tx: Sender<RouterCmd>,
    inbound_rx: Receiver<(Bytes, Vec<Bytes>)>,
    options: SocketOptions,
    monitor: SharedMonitor,
    _accept_task: compio::runtime::Task<()>,
    _hub_task: compio::runtime::Task<()>,
}

impl RouterSocket {
    /// Bind and start accepting connections with default options.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Self::bind_with_options(addr, BufferConfig::large(), SocketOptions::default()).await
    }

    /// Bind and start accepting connections with custom buffer config and options.
    pub async fn bind_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let listener_addr = listener.local_addr()?;
        debug!("[ROUTER] Bound to {}", listener_addr);

        let (hub_tx, hub_rx) = flume::unbounded::<HubEvent>();
        let (user_tx, user_rx) = flume::unbounded::<RouterCmd>();
        let (inbound_tx, inbound_rx) = flume::unbounded::<(Bytes, Vec<Bytes>)>();

        let hub = RouterHub::with_handover(
            hub_rx,
            user_rx,
            RouterBehavior::Standard,
            options.router_handover,
        );
        let hub_task = compio::runtime::spawn(hub.run());

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(Endpoint::Tcp(listener_addr)));

        let accept_options = options.clone();
        let accept_task = compio::runtime::spawn(accept_loop(
            listener,
            accept_options,
            config,
            hub_tx,
            inbound_tx,
            monitor.clone(),
        ));

        Ok(Self {
            listener_addr,
            cmd_tx: user_tx,
            inbound_rx,
            options,
            monitor,
            _accept_task: accept_task,
            _hub_task: hub_task,
        })
    }

    /// Bind and accept `tls://` connections with default options.
    pub async fn bind_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Self::bind_with(addr, BufferConfig::large(), options, accept_loop_tls).await
    }

    /// Bind and accept `ws://` connections with default options.
    pub async fn bind_ws(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Self::bind_with(addr, BufferConfig::large(), options, accept_loop_ws).await
    }

    /// Bind and accept `wss://` connections with default options.
    pub async fn bind_wss(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Self::bind_with(addr, BufferConfig::large(), options, accept_loop_wss).await
    }

    /// Shared bind path for the plain-TCP and TLS/WS/WSS constructors: spin
    /// up the hub, then hand the listener to whichever accept loop matches
    /// the requested transport.
    async fn bind_with<F, Fut>(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
        accept: F,
    ) -> io::Result<Self>
    where
        F: FnOnce(
            TcpListener,
            SocketOptions,
            BufferConfig,
            Sender<HubEvent>,
            Sender<(Bytes, Vec<Bytes>)>,
            SharedMonitor,
        ) -> Fut,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let listener_addr = listener.local_addr()?;
        debug!("[ROUTER] Bound to {}", listener_addr);

        let (hub_tx, hub_rx) = flume::unbounded::<HubEvent>();
        let (user_tx, user_rx) = flume::unbounded::<RouterCmd>();
        let (inbound_tx, inbound_rx) = flume::unbounded::<(Bytes, Vec<Bytes>)>();

        let hub = RouterHub::with_handover(
            hub_rx,
            user_rx,
            RouterBehavior::Standard,
            options.router_handover,
        );
        let hub_task = compio::runtime::spawn(hub.run());

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(Endpoint::Tcp(listener_addr)));

        let accept_options = options.clone();
        let accept_task = compio::runtime::spawn(accept(
            listener,
            accept_options,
            config,
            hub_tx,
            inbound_tx,
            monitor.clone(),
        ));

        Ok(Self {
            listener_addr,
            cmd_tx: user_tx,
            inbound_rx,
            options,
            monitor,
            _accept_task: accept_task,
            _hub_task: hub_task,
        })
    }

    /// Attach a monitor channel to receive lifecycle events for this socket.
    ///
    /// Events emitted before the first call to `monitor()` (e.g. the initial
    /// `Listening` event from `bind`) are not buffered and will be missed;
    /// call this before relying on the receiver to see every lifecycle
    /// transition.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.monitor.attach()
    }

    /// Receive a message; first frame is the sender's routing id, followed
    /// by the message body.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        match self.inbound_rx.recv_async().await {
            Ok((routing_id, mut body)) => {
                let mut out = Vec::with_capacity(body.len() + 1);
                out.push(routing_id);
                out.append(&mut body);
                Ok(Some(out))
            }
            Err(_) => Ok(None),
        }
    }

    /// Send a message; expects `[routing_id, body...]`.
    ///
    /// With `router_mandatory` unset (the default), an unknown routing id is
    /// silently dropped, matching libzmq ROUTER behavior. With
    /// `router_mandatory` set, an unknown routing id fails the send with
    /// `ErrorKind::NotFound` instead. Either way, a known peer whose
    /// outbound queue is already at `send_hwm` capacity fails the send with
    /// `ErrorKind::WouldBlock` (§8 scenario 6).
    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.cmd_tx
            .send_async(RouterCmd::SendMessage(msg, reply_tx))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "router hub closed"))?;
        let outcome = reply_rx
            .recv_async()
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "router hub closed"))?;
        match outcome {
            SendOutcome::Delivered => Ok(()),
            SendOutcome::UnknownPeer if self.options.router_mandatory => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "router_mandatory: routing id unreachable",
            )),
            SendOutcome::UnknownPeer => Ok(()),
            SendOutcome::WouldBlock => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "send HWM reached"))
            }
        }
    }

    /// Get the local address this socket is bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.listener_addr
    }

    /// Get the socket type.
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Router
    }

    /// Get a reference to the socket options.
    pub const fn options(&self) -> &SocketOptions {
        &self.options
    }
}

async fn accept_loop(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<HubEvent>,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[ROUTER] accept() failed: {}", e);
                continue;
            }
        };
        if zlink_core::tcp::enable_tcp_nodelay(&stream).is_err() {
            debug!(peer = %peer_addr, "[ROUTER] failed to enable TCP_NODELAY");
        }

        if !spawn_peer(stream, peer_addr, &options, &hub_tx, &inbound_tx, &monitor).await {
            break;
        }
    }
}

/// TLS-wrapping accept loop backing [`RouterSocket::bind_tls`].
async fn accept_loop_tls(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<HubEvent>,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[ROUTER] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_tls(stream, &options).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[ROUTER] TLS handshake failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::Auth,
                });
                continue;
            }
        };

        if !spawn_peer(stream, peer_addr, &options, &hub_tx, &inbound_tx, &monitor).await {
            break;
        }
    }
}

/// WebSocket-upgrading accept loop backing [`RouterSocket::bind_ws`].
async fn accept_loop_ws(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<HubEvent>,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[ROUTER] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_ws(stream).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[ROUTER] WS upgrade failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::NoDetail,
                });
                continue;
            }
        };

        if !spawn_peer(stream, peer_addr, &options, &hub_tx, &inbound_tx, &monitor).await {
            break;
        }
    }
}

/// TLS+WebSocket accept loop backing [`RouterSocket::bind_wss`].
async fn accept_loop_wss(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<HubEvent>,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[ROUTER] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_wss(stream, &options).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[ROUTER] WSS upgrade failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::Auth,
                });
                continue;
            }
        };

        if !spawn_peer(stream, peer_addr, &options, &hub_tx, &inbound_tx, &monitor).await {
            break;
        }
    }
}

/// Complete the HELLO/READY handshake over an already-established stream,
/// register the new peer with the hub and spawn its peer task.
///
/// Returns `false` when the hub has gone away, signalling the caller's
/// accept loop to stop.
async fn spawn_peer<S>(
    mut stream: S,
    peer_addr: SocketAddr,
    options: &SocketOptions,
    hub_tx: &Sender<HubEvent>,
    inbound_tx: &Sender<(Bytes, Vec<Bytes>)>,
    monitor: &SharedMonitor,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let endpoint = Endpoint::Tcp(peer_addr);
    monitor.emit(SocketEvent::ConnectionReady(endpoint.clone()));

    let handshake = perform_handshake_with_timeout(
        &mut stream,
        SocketType::Router,
        Some(options.handshake_timeout),
    )
    .await;

    let Ok(handshake_result) = handshake else {
        debug!(peer = %peer_addr, "[ROUTER] handshake failed");
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
        "[ROUTER] accepted peer"
    );
    monitor.emit(SocketEvent::Accepted(endpoint.clone()));

    let base = SocketBase::new(stream, SocketType::Router, options.clone());
    let (peer_cmd_tx, peer_cmd_rx) = peer_channel(options.send_hwm);

    if hub_tx
        .send(HubEvent::PeerUp {
            routing_id: routing_id.clone(),
            tx: peer_cmd_tx,
        })
        .is_err()
    {
        return false;
    }

    compio::runtime::spawn(run_peer(
        base,
        routing_id,
        inbound_tx.clone(),
        peer_cmd_rx,
        hub_tx.clone(),
        endpoint,
        monitor.clone(),
    ))
    .detach();

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn test_router_bind() {
        let router = RouterSocket::bind("127.0.0.1:0").await.unwrap();
        assert!(router.local_addr().port() > 0);
        assert_eq!(router.socket_type(), SocketType::Router);
    }
}
