//! SUB socket implementation.
//!
//! SUB sockets fan in from one or more PUB/XPUB peers. Subscriptions are
//! tracked locally (so a late-joining peer connection can be caught up) and
//! forwarded upstream as SUBSCRIBE/CANCEL-flagged ZMP frames (§4.2) so the
//! publisher only has to send topics someone actually wants; messages are
//! also filtered again on receipt as a defensive second check.

use bytes::Bytes;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::TcpStream;
use flume::{Receiver, Sender};
use futures::FutureExt;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::debug;

use zlink_core::config::BufferConfig;
use zlink_core::endpoint::Endpoint;
use zlink_core::monitor::{HandshakeFailure, SharedMonitor, SocketEvent, SocketMonitor};
use zlink_core::options::SocketOptions;
use zlink_core::socket_type::SocketType;
use zlink_core::subscription::SubscriptionTrie;

use crate::base::SocketBase;
use crate::codec::ZmpFrame;
use crate::handshake::perform_handshake_with_timeout;
use crate::router::recv_multipart;
use crate::transport;

/// Commands sent from the application to a single SUB peer connection.
#[derive(Debug)]
enum SubCmd {
    Subscribe(Bytes),
    Unsubscribe(Bytes),
    Close,
}

/// SUB socket: many-publisher fan-in with local topic filtering.
pub struct SubSocket {
    options: SocketOptions,
    subscriptions: Arc<Mutex<SubscriptionTrie>>,
    peer_cmd_txs: Arc<Mutex<Vec<Sender<SubCmd>>>>,
    inbound_tx: Sender<Vec<Bytes>>,
    inbound_rx: Receiver<Vec<Bytes>>,
    monitor: SharedMonitor,
}

impl SubSocket {
    /// Create a SUB socket with no connections yet.
    #[must_use]
    pub fn new(options: SocketOptions) -> Self {
        let (inbound_tx, inbound_rx) = flume::unbounded();
        Self {
            options,
            subscriptions: Arc::new(Mutex::new(SubscriptionTrie::new())),
            peer_cmd_txs: Arc::new(Mutex::new(Vec::new())),
            inbound_tx,
            inbound_rx,
            monitor: SharedMonitor::none(),
        }
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.monitor.attach()
    }

    /// Connect to a publisher with default buffer configuration.
    pub async fn connect(&self, addr: &str) -> io::Result<()> {
        self.connect_with_config(addr, BufferConfig::default()).await
    }

    /// Connect to an additional publisher; existing subscriptions are
    /// replayed to the new connection immediately.
    pub async fn connect_with_config(&self, addr: &str, config: BufferConfig) -> io::Result<()> {
        let mut stream = TcpStream::connect(addr).await?;
        zlink_core::tcp::enable_tcp_nodelay(&stream)?;

        let options = self
            .options
            .clone()
            .with_buffer_sizes(config.read_buf_size, config.write_buf_size);

        let endpoint = addr.parse().map(Endpoint::Tcp).ok();
        if let Some(ep) = &endpoint {
            self.monitor.emit(SocketEvent::ConnectionReady(ep.clone()));
        }

        let handshake_result = perform_handshake_with_timeout(
            &mut stream,
            SocketType::Sub,
            Some(options.handshake_timeout),
        )
        .await
        .map_err(|e| {
            if let Some(ep) = &endpoint {
                self.monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: ep.clone(),
                    reason: HandshakeFailure::Protocol,
                });
            }
            io::Error::other(format!("Handshake failed: {}", e))
        })?;

        debug!(
            peer = %addr,
            peer_socket_type = %handshake_result.peer_socket_type,
            "[SUB] connected"
        );
        if let Some(ep) = &endpoint {
            self.monitor.emit(SocketEvent::Connected(ep.clone()));
        }

        let base = SocketBase::new(stream, SocketType::Sub, options);
        let (cmd_tx, cmd_rx) = flume::unbounded::<SubCmd>();

        // Replay current subscriptions to the new peer.
        for sub in self.subscriptions.lock().subscriptions() {
            let _ = cmd_tx.send(SubCmd::Subscribe(sub.prefix.clone()));
        }
        self.peer_cmd_txs.lock().push(cmd_tx);

        compio::runtime::spawn(run_sub_peer(
            base,
            cmd_rx,
            self.inbound_tx.clone(),
            Arc::clone(&self.subscriptions),
            endpoint,
            self.monitor.clone(),
        ))
        .detach();

        Ok(())
    }

    /// Connect to a publisher over `tls://`.
    pub async fn connect_tls(&self, addr: &str) -> io::Result<()> {
        let stream = transport::connect_tls(addr, &self.options).await?;
        let endpoint = addr.parse().ok().map(Endpoint::Tls);
        self.attach_peer(stream, addr, endpoint).await
    }

    /// Connect to a publisher over `ws://`.
    pub async fn connect_ws(&self, addr: &str, path: &str) -> io::Result<()> {
        let stream = transport::connect_ws(addr, path).await?;
        let endpoint = addr.parse().ok().map(|a| Endpoint::Ws { addr: a, path: path.to_string() });
        self.attach_peer(stream, addr, endpoint).await
    }

    /// Connect to a publisher over `wss://`.
    pub async fn connect_wss(&self, addr: &str, path: &str) -> io::Result<()> {
        let stream = transport::connect_wss(addr, path, &self.options).await?;
        let endpoint = addr.parse().ok().map(|a| Endpoint::Wss { addr: a, path: path.to_string() });
        self.attach_peer(stream, addr, endpoint).await
    }

    /// Drive the HELLO/READY handshake over an already-established stream
    /// and spawn its peer task, sharing the accumulated subscription state.
    async fn attach_peer<S>(&self, mut stream: S, addr: &str, endpoint: Option<Endpoint>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + 'static,
    {
        let options = self.options.clone();

        if let Some(ep) = &endpoint {
            self.monitor.emit(SocketEvent::ConnectionReady(ep.clone()));
        }

        let handshake_result = perform_handshake_with_timeout(
            &mut stream,
            SocketType::Sub,
            Some(options.handshake_timeout),
        )
        .await
        .map_err(|e| {
            if let Some(ep) = &endpoint {
                self.monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: ep.clone(),
                    reason: HandshakeFailure::Protocol,
                });
            }
            io::Error::other(format!("Handshake failed: {}", e))
        })?;

        debug!(
            peer = %addr,
            peer_socket_type = %handshake_result.peer_socket_type,
            "[SUB] connected"
        );
        if let Some(ep) = &endpoint {
            self.monitor.emit(SocketEvent::Connected(ep.clone()));
        }

        let base = SocketBase::new(stream, SocketType::Sub, options);
        let (cmd_tx, cmd_rx) = flume::unbounded::<SubCmd>();

        for sub in self.subscriptions.lock().subscriptions() {
            let _ = cmd_tx.send(SubCmd::Subscribe(sub.prefix.clone()));
        }
        self.peer_cmd_txs.lock().push(cmd_tx);

        compio::runtime::spawn(run_sub_peer(
            base,
            cmd_rx,
            self.inbound_tx.clone(),
            Arc::clone(&self.subscriptions),
            endpoint,
            self.monitor.clone(),
        ))
        .detach();

        Ok(())
    }

    /// Subscribe to messages with the given prefix (empty = all).
    pub fn subscribe(&self, prefix: impl Into<Bytes>) {
        let prefix = prefix.into();
        self.subscriptions.lock().subscribe(prefix.clone());
        self.peer_cmd_txs
            .lock()
            .retain(|tx| tx.send(SubCmd::Subscribe(prefix.clone())).is_ok());
    }

    /// Unsubscribe from messages with the given prefix.
    pub fn unsubscribe(&self, prefix: impl Into<Bytes>) {
        let prefix = prefix.into();
        self.subscriptions.lock().unsubscribe(&prefix);
        self.peer_cmd_txs
            .lock()
            .retain(|tx| tx.send(SubCmd::Unsubscribe(prefix.clone())).is_ok());
    }

    /// Receive the next message matching an active subscription.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        match self.inbound_rx.recv_async().await {
            Ok(frames) => Ok(Some(frames)),
            Err(_) => Ok(None),
        }
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Get the socket type.
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Sub
    }
}

impl Drop for SubSocket {
    fn drop(&mut self) {
        for tx in self.peer_cmd_txs.lock().iter() {
            let _ = tx.send(SubCmd::Close);
        }
    }
}

async fn run_sub_peer<S>(
    mut base: SocketBase<S>,
    cmd_rx: Receiver<SubCmd>,
    inbound_tx: Sender<Vec<Bytes>>,
    subscriptions: Arc<Mutex<SubscriptionTrie>>,
    endpoint: Option<Endpoint>,
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
                        let matches = frames
                            .first()
                            .is_some_and(|topic| subscriptions.lock().matches(topic));
                        if matches && inbound_tx.send_async(frames).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            cmd = cmd_fut => {
                match cmd {
                    Ok(SubCmd::Subscribe(prefix)) => {
                        if send_sub_frame(&mut base, prefix, false).await.is_err() {
                            break;
                        }
                    }
                    Ok(SubCmd::Unsubscribe(prefix)) => {
                        if send_sub_frame(&mut base, prefix, true).await.is_err() {
                            break;
                        }
                    }
                    Ok(SubCmd::Close) | Err(_) => break,
                }
            }
        }
    }

    if let Some(ep) = endpoint {
        monitor.emit(SocketEvent::Disconnected(ep));
    }
}

async fn send_sub_frame<S>(base: &mut SocketBase<S>, prefix: Bytes, cancel: bool) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = ZmpFrame::subscribe(prefix, cancel).encode();
    base.write_buf.clear();
    base.write_buf.extend_from_slice(&frame);
    base.write_from_buf().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_creation_and_subscribe() {
        let sub = SubSocket::new(SocketOptions::default());
        sub.subscribe(Bytes::from_static(b"topic."));
        assert_eq!(sub.subscription_count(), 1);
        sub.unsubscribe(Bytes::from_static(b"topic."));
        assert_eq!(sub.subscription_count(), 0);
    }
}
