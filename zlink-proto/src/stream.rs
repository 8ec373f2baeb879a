//! STREAM socket implementation (§4.3).
//!
//! Unlike every other socket type, STREAM speaks no ZMP handshake at all:
//! it exposes each accepted/connected raw TCP byte stream as an addressable
//! peer, and delivers connect/disconnect lifecycle as two-frame messages
//! instead of running HELLO/READY. This lets a STREAM socket interoperate
//! with plain TCP clients that know nothing about ZMP.
//!
//! Wire contract (§4.3, §8 scenario 4):
//! - connect: `[routing_id][0x01]`
//! - disconnect: `[routing_id][0x00]`
//! - data: `[routing_id][payload]`
//!
//! `routing_id` is the 5-byte zero-prefixed auto id (§3) unless the peer (for
//! the connecting side) set `connect_routing_id` before `connect`, in which
//! case that 1..255-byte blob is used instead. `maxmsgsize` bounds each
//! inbound payload; a violation disconnects only that one peer.
//!
//! Built the same way [`crate::router::RouterSocket`] fans accepted peers out
//! to background tasks over `flume` channels — STREAM just skips the
//! handshake and codec stages since there is no framing to negotiate.

use bytes::Bytes;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::{TcpListener, TcpStream};
use flume::{Receiver, Sender};
use futures::FutureExt;
use std::io;
use std::net::SocketAddr;
use tracing::{debug, trace};

use zlink_core::alloc::IoBytes;
use zlink_core::config::BufferConfig;
use zlink_core::endpoint::Endpoint;
use zlink_core::monitor::{HandshakeFailure, SharedMonitor, SocketEvent, SocketMonitor};
use zlink_core::options::SocketOptions;
use zlink_core::socket_type::SocketType;

use crate::routing_id;
use crate::transport;

const CONNECT_EVENT: u8 = 0x01;
const DISCONNECT_EVENT: u8 = 0x00;

/// Commands sent from the application to a single STREAM peer connection.
#[derive(Debug)]
enum StreamPeerCmd {
    Send(Bytes),
    Close,
}

/// STREAM socket: raw per-peer byte stream with connect/disconnect framing.
pub struct StreamSocket {
    listener_addr: Option<SocketAddr>,
    options: SocketOptions,
    peer_cmd_txs: std::sync::Arc<parking_lot::Mutex<hashbrown::HashMap<Bytes, Sender<StreamPeerCmd>>>>,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    inbound_rx: Receiver<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
    _accept_task: Option<compio::runtime::Task<()>>,
}

impl StreamSocket {
    /// Bind and start accepting raw TCP peers with default options.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Self::bind_with_options(addr, BufferConfig::default(), SocketOptions::default()).await
    }

    /// Bind and start accepting raw TCP peers with custom options.
    pub async fn bind_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let listener_addr = listener.local_addr()?;
        debug!("[STREAM] bound to {}", listener_addr);

        let (inbound_tx, inbound_rx) = flume::unbounded();
        let peer_cmd_txs: std::sync::Arc<
            parking_lot::Mutex<hashbrown::HashMap<Bytes, Sender<StreamPeerCmd>>>,
        > = std::sync::Arc::new(parking_lot::Mutex::new(hashbrown::HashMap::new()));

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(Endpoint::Tcp(listener_addr)));

        let accept_task = compio::runtime::spawn(accept_loop(
            listener,
            options.clone(),
            config,
            peer_cmd_txs.clone(),
            inbound_tx.clone(),
            monitor.clone(),
        ));

        Ok(Self {
            listener_addr: Some(listener_addr),
            options,
            peer_cmd_txs,
            inbound_tx,
            inbound_rx,
            monitor,
            _accept_task: Some(accept_task),
        })
    }

    /// Connect to a single STREAM (or plain TCP) peer. The returned socket
    /// delivers exactly one connect event, then data/disconnect events, for
    /// that one peer.
    pub async fn connect(addr: &str) -> io::Result<Self> {
        Self::connect_with_options(addr, BufferConfig::default(), SocketOptions::default()).await
    }

    /// Connect with custom buffer config and options (`connect_routing_id`,
    /// if set, fixes the id this peer is addressed by instead of an
    /// auto-generated one).
    pub async fn connect_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        zlink_core::tcp::enable_tcp_nodelay(&stream)?;
        let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
        Self::from_connected_stream(stream, addr, options)
    }

    /// Connect to a single peer over `tls://`.
    pub async fn connect_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        let stream = transport::connect_tls(addr, &options).await?;
        Self::from_connected_stream(stream, addr, options)
    }

    /// Connect to a single peer over `ws://`.
    pub async fn connect_ws(addr: &str, path: &str, options: SocketOptions) -> io::Result<Self> {
        let stream = transport::connect_ws(addr, path).await?;
        Self::from_connected_stream(stream, addr, options)
    }

    /// Connect to a single peer over `wss://`.
    pub async fn connect_wss(addr: &str, path: &str, options: SocketOptions) -> io::Result<Self> {
        let stream = transport::connect_wss(addr, path, &options).await?;
        Self::from_connected_stream(stream, addr, options)
    }

    /// Spawn the single-peer task for an already-established stream (no ZMP
    /// handshake: STREAM speaks no handshake on either side, so the
    /// transport-level connect itself is reported as both `ConnectionReady`
    /// and `Connected`).
    fn from_connected_stream<S>(stream: S, addr: &str, options: SocketOptions) -> io::Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let routing_id = match &options.connect_routing_id {
            Some(id) => id.clone(),
            None => routing_id::generate(),
        };

        let endpoint = addr
            .parse()
            .map(Endpoint::Tcp)
            .or_else(|_| Endpoint::parse(addr))
            .unwrap_or_else(|_| Endpoint::Inproc(addr.to_string()));
        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::ConnectionReady(endpoint.clone()));
        monitor.emit(SocketEvent::Connected(endpoint.clone()));

        let (inbound_tx, inbound_rx) = flume::unbounded();
        let peer_cmd_txs: std::sync::Arc<
            parking_lot::Mutex<hashbrown::HashMap<Bytes, Sender<StreamPeerCmd>>>,
        > = std::sync::Arc::new(parking_lot::Mutex::new(hashbrown::HashMap::new()));

        let (cmd_tx, cmd_rx) = flume::unbounded::<StreamPeerCmd>();
        peer_cmd_txs.lock().insert(routing_id.clone(), cmd_tx);

        let max_msg_size = options.max_msg_size;
        let read_buffer_size = options.read_buffer_size;
        let _peer_task = compio::runtime::spawn(run_stream_peer(
            stream,
            routing_id,
            cmd_rx,
            inbound_tx.clone(),
            max_msg_size,
            read_buffer_size,
            endpoint,
            monitor.clone(),
        ))
        .detach();

        Ok(Self {
            listener_addr: None,
            options,
            peer_cmd_txs,
            inbound_tx,
            inbound_rx,
            monitor,
            _accept_task: None,
        })
    }

    /// Bind and accept `tls://` peers.
    pub async fn bind_tls(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Self::bind_transport(addr, BufferConfig::default(), options, accept_loop_tls).await
    }

    /// Bind and accept `ws://` peers.
    pub async fn bind_ws(addr: &str, options: SocketOptions) -> io::Result<Self> {
        Self::bind_transport(addr, BufferConfig::default(), options, accept_loop_ws).await
    }

    /// Bind and accept `wss://` peers.
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
        F: FnOnce(
            TcpListener,
            SocketOptions,
            BufferConfig,
            PeerMap,
            Sender<(Bytes, Vec<Bytes>)>,
            SharedMonitor,
        ) -> Fut,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let listener_addr = listener.local_addr()?;
        debug!("[STREAM] bound to {}", listener_addr);

        let (inbound_tx, inbound_rx) = flume::unbounded();
        let peer_cmd_txs: PeerMap =
            std::sync::Arc::new(parking_lot::Mutex::new(hashbrown::HashMap::new()));

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(Endpoint::Tcp(listener_addr)));

        let accept_task = compio::runtime::spawn(accept(
            listener,
            options.clone(),
            config,
            peer_cmd_txs.clone(),
            inbound_tx.clone(),
            monitor.clone(),
        ));

        Ok(Self {
            listener_addr: Some(listener_addr),
            options,
            peer_cmd_txs,
            inbound_tx,
            inbound_rx,
            monitor,
            _accept_task: Some(accept_task),
        })
    }

    /// Attach a monitor channel to receive lifecycle events for this socket.
    ///
    /// Events emitted before the first call to `monitor()` are not
    /// buffered; call this before binding/connecting if you need to observe
    /// every transition.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.monitor.attach()
    }

    /// Receive the next event: `[routing_id, 0x01]` (connect),
    /// `[routing_id, 0x00]` (disconnect), or `[routing_id, payload]` (data).
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        match self.inbound_rx.recv_async().await {
            Ok((routing_id, mut frames)) => {
                let mut out = Vec::with_capacity(frames.len() + 1);
                out.push(routing_id);
                out.append(&mut frames);
                Ok(Some(out))
            }
            Err(_) => Ok(None),
        }
    }

    /// Send raw bytes to the peer addressed by `routing_id` (the first
    /// frame of `msg`); unknown ids are silently dropped, matching ROUTER's
    /// default policy for unaddressable peers.
    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        let mut it = msg.into_iter();
        let Some(routing_id) = it.next() else {
            return Ok(());
        };
        let payload = it.next().unwrap_or_default();
        let tx = self.peer_cmd_txs.lock().get(&routing_id).cloned();
        if let Some(tx) = tx {
            let _ = tx.send_async(StreamPeerCmd::Send(payload)).await;
        }
        Ok(())
    }

    /// Bound local address, if this socket was created with `bind`.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.listener_addr
    }

    /// Get the socket type.
    #[must_use]
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Stream
    }

    /// Get a reference to the socket options.
    #[must_use]
    pub const fn options(&self) -> &SocketOptions {
        &self.options
    }
}

type PeerMap = std::sync::Arc<parking_lot::Mutex<hashbrown::HashMap<Bytes, Sender<StreamPeerCmd>>>>;

async fn accept_loop(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    peer_cmd_txs: PeerMap,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[STREAM] accept() failed: {}", e);
                continue;
            }
        };
        if zlink_core::tcp::enable_tcp_nodelay(&stream).is_err() {
            debug!(peer = %peer_addr, "[STREAM] failed to enable TCP_NODELAY");
        }

        spawn_accepted_peer(stream, peer_addr, &options, &peer_cmd_txs, &inbound_tx, &monitor);
    }
}

async fn accept_loop_tls(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    peer_cmd_txs: PeerMap,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[STREAM] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_tls(stream, &options).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[STREAM] TLS handshake failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::Auth,
                });
                continue;
            }
        };
        spawn_accepted_peer(stream, peer_addr, &options, &peer_cmd_txs, &inbound_tx, &monitor);
    }
}

async fn accept_loop_ws(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    peer_cmd_txs: PeerMap,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[STREAM] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_ws(stream).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[STREAM] WS upgrade failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::NoDetail,
                });
                continue;
            }
        };
        spawn_accepted_peer(stream, peer_addr, &options, &peer_cmd_txs, &inbound_tx, &monitor);
    }
}

async fn accept_loop_wss(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    peer_cmd_txs: PeerMap,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[STREAM] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_wss(stream, &options).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[STREAM] WSS upgrade failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::Auth,
                });
                continue;
            }
        };
        spawn_accepted_peer(stream, peer_addr, &options, &peer_cmd_txs, &inbound_tx, &monitor);
    }
}

/// Register and spawn the peer task for a freshly accepted (and, for
/// TLS/WS/WSS, already upgraded) stream. STREAM has no handshake, so the
/// accept itself is reported as `Accepted` followed immediately by
/// `Connected`.
fn spawn_accepted_peer<S>(
    stream: S,
    peer_addr: SocketAddr,
    options: &SocketOptions,
    peer_cmd_txs: &PeerMap,
    inbound_tx: &Sender<(Bytes, Vec<Bytes>)>,
    monitor: &SharedMonitor,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let routing_id = routing_id::generate();
    trace!(peer = %peer_addr, routing_id = ?routing_id, "[STREAM] accepted peer");

    let endpoint = Endpoint::Tcp(peer_addr);
    monitor.emit(SocketEvent::ConnectionReady(endpoint.clone()));
    monitor.emit(SocketEvent::Accepted(endpoint.clone()));
    monitor.emit(SocketEvent::Connected(endpoint.clone()));

    let (cmd_tx, cmd_rx) = flume::unbounded::<StreamPeerCmd>();
    peer_cmd_txs.lock().insert(routing_id.clone(), cmd_tx);

    let max_msg_size = options.max_msg_size;
    let read_buffer_size = options.read_buffer_size;
    let peer_map = peer_cmd_txs.clone();
    let id_for_cleanup = routing_id.clone();
    let inbound_tx = inbound_tx.clone();
    let monitor = monitor.clone();
    compio::runtime::spawn(async move {
        run_stream_peer(
            stream,
            routing_id,
            cmd_rx,
            inbound_tx,
            max_msg_size,
            read_buffer_size,
            endpoint,
            monitor,
        )
        .await;
        peer_map.lock().remove(&id_for_cleanup);
    })
    .detach();
}

#[allow(clippy::too_many_arguments)]
async fn run_stream_peer<S>(
    mut stream: S,
    routing_id: Bytes,
    cmd_rx: Receiver<StreamPeerCmd>,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    max_msg_size: Option<usize>,
    read_buffer_size: usize,
    endpoint: Endpoint,
    monitor: SharedMonitor,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if inbound_tx
        .send_async((routing_id.clone(), vec![Bytes::copy_from_slice(&[CONNECT_EVENT])]))
        .await
        .is_err()
    {
        return;
    }

    loop {
        let read_buf = vec![0u8; read_buffer_size];
        let read_fut = AsyncRead::read(&mut stream, read_buf).fuse();
        let cmd_fut = cmd_rx.recv_async().fuse();
        futures::pin_mut!(read_fut, cmd_fut);

        futures::select! {
            res = read_fut => {
                use compio::buf::BufResult;
                let BufResult(result, returned) = res;
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Some(max) = max_msg_size {
                            if n > max {
                                debug!(routing_id = ?routing_id, n, max, "[STREAM] payload exceeds maxmsgsize, disconnecting peer");
                                break;
                            }
                        }
                        let payload = Bytes::copy_from_slice(&returned[..n]);
                        if inbound_tx.send_async((routing_id.clone(), vec![payload])).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            cmd = cmd_fut => {
                match cmd {
                    Ok(StreamPeerCmd::Send(payload)) => {
                        use compio::buf::BufResult;
                        let BufResult(result, _) = AsyncWrite::write(&mut stream, IoBytes::new(payload)).await;
                        if result.is_err() {
                            break;
                        }
                    }
                    Ok(StreamPeerCmd::Close) | Err(_) => break,
                }
            }
        }
    }

    let _ = inbound_tx
        .send_async((routing_id, vec![Bytes::copy_from_slice(&[DISCONNECT_EVENT])]))
        .await;
    monitor.emit(SocketEvent::Disconnected(endpoint));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn test_stream_bind() {
        let stream = StreamSocket::bind("127.0.0.1:0").await.unwrap();
        assert!(stream.local_addr().unwrap().port() > 0);
        assert_eq!(stream.socket_type(), SocketType::Stream);
    }

    #[compio::test]
    async fn test_stream_connect_event_and_echo() {
        let mut server = StreamSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let mut client = StreamSocket::connect(&addr.to_string()).await.unwrap();

        // Server sees the client's connect event first.
        let msg = server.recv().await.unwrap().unwrap();
        assert_eq!(msg.len(), 2);
        assert_eq!(msg[1], Bytes::copy_from_slice(&[CONNECT_EVENT]));
        let server_routing_id = msg[0].clone();

        // Client also sees its own connect event for the new connection.
        let client_msg = client.recv().await.unwrap().unwrap();
        assert_eq!(client_msg[1], Bytes::copy_from_slice(&[CONNECT_EVENT]));

        server
            .send(vec![server_routing_id, Bytes::from_static(b"hello")])
            .await
            .unwrap();

        let data = client.recv().await.unwrap().unwrap();
        assert_eq!(data[1], Bytes::from_static(b"hello"));
    }
}
