//! XPUB (Extended Publisher) socket implementation.
//!
//! XPUB behaves exactly like [`crate::publisher::PubSocket`] on the send
//! side, but additionally surfaces every SUBSCRIBE/CANCEL frame it receives
//! to the application as a [`SubscriptionEvent`] — useful for brokers that
//! forward subscriptions upstream or maintain a last-value cache. Fan-out
//! and subscription bookkeeping are owned by the same
//! [`zlink_core::pubsub::hub::PubSubHub`] used by PUB; the only difference
//! is that the peer task is also given a channel to forward subscription
//! frames to the application (see [`crate::publisher::run_subscriber_peer`]).

use bytes::Bytes;
use compio::net::TcpListener;
use flume::{Receiver, Sender};
use std::io;
use std::net::SocketAddr;
use tracing::debug;

use zlink_core::config::BufferConfig;
use zlink_core::endpoint::Endpoint;
use zlink_core::monitor::{HandshakeFailure, SharedMonitor, SocketEvent, SocketMonitor};
use zlink_core::options::SocketOptions;
use zlink_core::pubsub::hub::{PubSubCmd, PubSubEvent, PubSubHub};
use zlink_core::socket_type::SocketType;
use zlink_core::subscription::SubscriptionEvent;

use crate::publisher::spawn_subscriber_peer;
use crate::transport;

/// XPUB socket: PUB with subscription events surfaced to the application.
pub struct XPubSocket {
    listener_addr: SocketAddr,
    cmd_tx: Sender<PubSubCmd>,
    event_rx: Receiver<(Bytes, bool)>,
    options: SocketOptions,
    monitor: SharedMonitor,
    _accept_task: compio::runtime::Task<()>,
    _hub_task: compio::runtime::Task<()>,
}

impl XPubSocket {
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
        debug!("[XPUB] Bound to {}", listener_addr);

        let (hub_tx, hub_rx) = flume::unbounded::<PubSubEvent>();
        let (user_tx, user_rx) = flume::unbounded::<PubSubCmd>();
        let (event_tx, event_rx) = flume::unbounded::<(Bytes, bool)>();

        let hub = PubSubHub::new(hub_rx, user_rx);
        let hub_task = compio::runtime::spawn(hub.run());

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(Endpoint::Tcp(listener_addr)));

        let accept_task = compio::runtime::spawn(accept_loop(
            listener,
            options.clone(),
            config,
            hub_tx,
            event_tx,
            monitor.clone(),
        ));

        Ok(Self {
            listener_addr,
            cmd_tx: user_tx,
            event_rx,
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

    /// Receive the next subscription event from any subscriber.
    ///
    /// In non-verbose mode (the default) duplicate subscribes to a prefix
    /// already subscribed by *some* peer are still surfaced once per peer —
    /// matching libzmq's XPUB default, which reports every transition seen
    /// on the wire rather than deduplicating across peers.
    pub async fn recv_subscription(&mut self) -> io::Result<Option<SubscriptionEvent>> {
        match self.event_rx.recv_async().await {
            Ok((prefix, is_subscribe)) => Ok(Some(SubscriptionEvent::from_prefix(prefix, is_subscribe))),
            Err(_) => Ok(None),
        }
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
        F: FnOnce(
            TcpListener,
            SocketOptions,
            BufferConfig,
            Sender<PubSubEvent>,
            Sender<(Bytes, bool)>,
            SharedMonitor,
        ) -> Fut,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let listener_addr = listener.local_addr()?;
        debug!("[XPUB] Bound to {}", listener_addr);

        let (hub_tx, hub_rx) = flume::unbounded::<PubSubEvent>();
        let (user_tx, user_rx) = flume::unbounded::<PubSubCmd>();
        let (event_tx, event_rx) = flume::unbounded::<(Bytes, bool)>();

        let hub = PubSubHub::new(hub_rx, user_rx);
        let hub_task = compio::runtime::spawn(hub.run());

        let monitor = SharedMonitor::none();
        monitor.emit(SocketEvent::Listening(Endpoint::Tcp(listener_addr)));

        let accept_task =
            compio::runtime::spawn(accept(listener, options.clone(), config, hub_tx, event_tx, monitor.clone()));

        Ok(Self {
            listener_addr,
            cmd_tx: user_tx,
            event_rx,
            options,
            monitor,
            _accept_task: accept_task,
            _hub_task: hub_task,
        })
    }

    /// Broadcast a message; frame 0 is the topic used for prefix matching.
    pub async fn send(&self, msg: Vec<Bytes>) -> io::Result<()> {
        self.cmd_tx
            .send_async(PubSubCmd::Publish(msg))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "xpub hub closed"))
    }

    /// Get the local address this socket is bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.listener_addr
    }

    /// Get the socket type.
    pub const fn socket_type(&self) -> SocketType {
        SocketType::XPub
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
    hub_tx: Sender<PubSubEvent>,
    event_tx: Sender<(Bytes, bool)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[XPUB] accept() failed: {}", e);
                continue;
            }
        };
        if zlink_core::tcp::enable_tcp_nodelay(&stream).is_err() {
            debug!(peer = %peer_addr, "[XPUB] failed to enable TCP_NODELAY");
        }

        if !spawn_subscriber_peer(
            stream,
            peer_addr,
            SocketType::XPub,
            &options,
            &hub_tx,
            Some(event_tx.clone()),
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
    event_tx: Sender<(Bytes, bool)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[XPUB] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_tls(stream, &options).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[XPUB] TLS handshake failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::Auth,
                });
                continue;
            }
        };
        if !spawn_subscriber_peer(
            stream,
            peer_addr,
            SocketType::XPub,
            &options,
            &hub_tx,
            Some(event_tx.clone()),
            &monitor,
        )
        .await
        {
            break;
        }
    }
}

async fn accept_loop_ws(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<PubSubEvent>,
    event_tx: Sender<(Bytes, bool)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[XPUB] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_ws(stream).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[XPUB] WS upgrade failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::NoDetail,
                });
                continue;
            }
        };
        if !spawn_subscriber_peer(
            stream,
            peer_addr,
            SocketType::XPub,
            &options,
            &hub_tx,
            Some(event_tx.clone()),
            &monitor,
        )
        .await
        {
            break;
        }
    }
}

async fn accept_loop_wss(
    listener: TcpListener,
    options: SocketOptions,
    config: BufferConfig,
    hub_tx: Sender<PubSubEvent>,
    event_tx: Sender<(Bytes, bool)>,
    monitor: SharedMonitor,
) {
    let options = options.with_buffer_sizes(config.read_buf_size, config.write_buf_size);
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[XPUB] accept() failed: {}", e);
                continue;
            }
        };
        let stream = match transport::accept_wss(stream, &options).await {
            Ok(s) => s,
            Err(e) => {
                debug!(peer = %peer_addr, "[XPUB] WSS upgrade failed: {}", e);
                monitor.emit(SocketEvent::HandshakeFailed {
                    endpoint: Endpoint::Tcp(peer_addr),
                    reason: HandshakeFailure::Auth,
                });
                continue;
            }
        };
        if !spawn_subscriber_peer(
            stream,
            peer_addr,
            SocketType::XPub,
            &options,
            &hub_tx,
            Some(event_tx.clone()),
            &monitor,
        )
        .await
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn test_xpub_bind() {
        let xpub = XPubSocket::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(xpub.socket_type(), SocketType::XPub);
        assert!(xpub.local_addr().port() > 0);
    }

    #[test]
    fn test_subscription_event_roundtrip() {
        let event = SubscriptionEvent::Subscribe(Bytes::from_static(b"topic"));
        let body = event.to_prefix_bytes();
        let parsed = SubscriptionEvent::from_prefix(body, event.is_subscribe());
        assert_eq!(parsed, event);
    }
}
