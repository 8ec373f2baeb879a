//! XSUB (Extended Subscriber) socket implementation.
//!
//! XSUB is the fan-in counterpart to [`crate::xpub::XPubSocket`]: it forwards
//! explicit SUBSCRIBE/CANCEL-flagged ZMP frames (§4.2) upstream instead of
//! filtering locally, which lets brokers relay subscriptions between a
//! frontend XSUB and a backend XPUB without decoding message bodies.

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

/// Commands sent from the application to a single XSUB peer connection.
#[derive(Debug)]
enum XSubCmd {
    Subscribe(Bytes),
    Unsubscribe(Bytes),
    Close,
}

/// XSUB socket: many-publisher fan-in with upstream subscription forwarding.
pub struct XSubSocket {
    options: SocketOptions,
    subscriptions: Arc<Mutex<SubscriptionTrie>>,
    peer_cmd_txs: Arc<Mutex<Vec<Sender<XSubCmd>>>>,
    inbound_tx: Sender<Vec<Bytes>>,
    inbound_rx: Receiver<Vec<Bytes>>,
    monitor: SharedMonitor,
}

impl XSubSocket {
    /// Create an XSUB socket with no connections yet.
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
            SocketType::XSub,
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
            "[XSUB] connected"
        );
        if let Some(ep) = &endpoint {
            self.monitor.emit(SocketEvent::Connected(ep.clone()));
        }

        let base = SocketBase::new(stream, SocketType::XSub, options);
        let (cmd_tx, cmd_rx) = flume::unbounded::<XSubCmd>();

        for sub in self.subscriptions.lock().subscriptions() {
            let _ = cmd_tx.send(XSubCmd::Subscribe(sub.prefix.clone()));
        }
        self.peer_cmd_txs.lock().push(cmd_tx);

        compio::runtime::spawn(run_xsub_peer(
            base,
            cmd_rx,
            self.inbound_tx.clone(),
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
            SocketType::XSub,
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
            "[XSUB] connected"
        );
        if let Some(ep) = &endpoint {
            self.monitor.emit(SocketEvent::Connected(ep.clone()));
        }

        let base = SocketBase::new(stream, SocketType::XSub, options);
        let (cmd_tx, cmd_rx) = flume::unbounded::<XSubCmd>();

        for sub in self.subscriptions.lock().subscriptions() {
            let _ = cmd_tx.send(XSubCmd::Subscribe(sub.prefix.clone()));
        }
        self.peer_cmd_txs.lock().push(cmd_tx);

        compio::runtime::spawn(run_xsub_peer(
            base,
            cmd_rx,
            self.inbound_tx.clone(),
            endpoint,
            self.monitor.clone(),
        ))
        .detach();

        Ok(())
    }

    /// Subscribe to messages with the given prefix (empty = all); forwards
    /// a SUBSCRIBE frame to every connected publisher.
    pub fn subscribe(&self, prefix: impl Into<Bytes>) {
        let prefix = prefix.into();
        self.subscriptions.lock().subscribe(prefix.clone());
        self.peer_cmd_txs
            .lock()
            .retain(|tx| tx.send(XSubCmd::Subscribe(prefix.clone())).is_ok());
    }

    /// Unsubscribe from messages with the given prefix; forwards a CANCEL
    /// frame to every connected publisher.
    pub fn unsubscribe(&self, prefix: impl Into<Bytes>) {
        let prefix = prefix.into();
        self.subscriptions.lock().unsubscribe(&prefix);
        self.peer_cmd_txs
            .lock()
            .retain(|tx| tx.send(XSubCmd::Unsubscribe(prefix.clone())).is_ok());
    }

    /// Forward a raw subscription event upstream without touching local
    /// subscription bookkeeping — used by proxies relaying a downstream
    /// XPUB's subscription events to an upstream publisher.
    pub fn send_subscription_event(&self, event: &zlink_core::subscription::SubscriptionEvent) {
        let prefix = event.to_prefix_bytes();
        let cmd = if event.is_subscribe() {
            XSubCmd::Subscribe(prefix)
        } else {
            XSubCmd::Unsubscribe(prefix)
        };
        self.peer_cmd_txs.lock().retain(|tx| match &cmd {
            XSubCmd::Subscribe(p) => tx.send(XSubCmd::Subscribe(p.clone())).is_ok(),
            XSubCmd::Unsubscribe(p) => tx.send(XSubCmd::Unsubscribe(p.clone())).is_ok(),
            XSubCmd::Close => tx.send(XSubCmd::Close).is_ok(),
        });
    }

    /// Receive the next data message (no local filtering: XSUB trusts its
    /// own upstream subscriptions to have already scoped delivery).
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

    /// Check if subscribed to a specific topic.
    pub fn is_subscribed(&self, topic: &[u8]) -> bool {
        self.subscriptions.lock().matches(topic)
    }

    /// Get the socket type.
    pub const fn socket_type(&self) -> SocketType {
        SocketType::XSub
    }
}

impl Drop for XSubSocket {
    fn drop(&mut self) {
        for tx in self.peer_cmd_txs.lock().iter() {
            let _ = tx.send(XSubCmd::Close);
        }
    }
}

async fn run_xsub_peer<S>(
    mut base: SocketBase<S>,
    cmd_rx: Receiver<XSubCmd>,
    inbound_tx: Sender<Vec<Bytes>>,
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
                        if inbound_tx.send_async(frames).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            cmd = cmd_fut => {
                match cmd {
                    Ok(XSubCmd::Subscribe(prefix)) => {
                        if send_sub_frame(&mut base, prefix, false).await.is_err() {
                            break;
                        }
                    }
                    Ok(XSubCmd::Unsubscribe(prefix)) => {
                        if send_sub_frame(&mut base, prefix, true).await.is_err() {
                            break;
                        }
                    }
                    Ok(XSubCmd::Close) | Err(_) => break,
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
    fn test_xsub_creation_and_subscribe() {
        let xsub = XSubSocket::new(SocketOptions::default());
        xsub.subscribe(Bytes::from_static(b"topic."));
        assert_eq!(xsub.subscription_count(), 1);
        xsub.unsubscribe(Bytes::from_static(b"topic."));
        assert_eq!(xsub.subscription_count(), 0);
    }
}
