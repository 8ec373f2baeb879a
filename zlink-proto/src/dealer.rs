//! DEALER socket implementation.
//!
//! DEALER is the asynchronous, load-balanced counterpart to ROUTER: it may
//! connect to one or more ROUTER/DEALER peers, sends are round-robined
//! across whichever peers are currently up, and receives are fair-queued
//! from all of them with no envelope manipulation.
//!
//! Built on the same [`zlink_core::router::RouterHub`] used by
//! [`crate::router::RouterSocket`], just with `RouterBehavior::LoadBalancer`.

use bytes::Bytes;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::TcpStream;
use flume::{Receiver, Sender};
use std::io;
use tracing::debug;

use zlink_core::config::BufferConfig;
use zlink_core::endpoint::Endpoint;
use zlink_core::monitor::{HandshakeFailure, SharedMonitor, SocketEvent, SocketMonitor};
use zlink_core::options::SocketOptions;
use zlink_core::router::{
    peer_channel, HubEvent, PeerCmd, RouterBehavior, RouterCmd, RouterHub, SendOutcome,
};
use zlink_core::socket_type::SocketType;

use crate::base::SocketBase;
use crate::handshake::perform_handshake_with_timeout;
use crate::router::run_peer;
use crate::routing_id;
use crate::transport;

/// DEALER socket: asynchronous, load-balanced message passing over TCP.
pub struct DealerSocket {
    cmd_tx: Sender<RouterCmd>,
    inbound_tx: Sender<(Bytes, Vec<Bytes>)>,
    inbound_rx: Receiver<(Bytes, Vec<Bytes>)>,
    hub_tx: Sender<HubEvent>,
    options: SocketOptions,
    monitor: SharedMonitor,
    _hub_task: compio::runtime::Task<()>,
}

impl DealerSocket {
    /// Connect to a single ROUTER/DEALER endpoint with default options.
    pub async fn connect(addr: &str) -> io::Result<Self> {
        Self::connect_with_options(addr, BufferConfig::large(), SocketOptions::default()).await
    }

    /// Connect to a single endpoint with custom buffer config and options.
    pub async fn connect_with_options(
        addr: &str,
        config: BufferConfig,
        options: SocketOptions,
    ) -> io::Result<Self> {
        let socket = Self::new_unconnected(options);
        socket.add_endpoint(addr, config).await?;
        Ok(socket)
    }

    /// Create a DEALER socket with no connections yet; use `add_endpoint` to
    /// connect to one or more peers (DEALER sockets may fan out to many).
    #[must_use]
    pub fn new_unconnected(options: SocketOptions) -> Self {
        let (hub_tx, hub_rx) = flume::unbounded::<HubEvent>();
        let (user_tx, user_rx) = flume::unbounded::<RouterCmd>();
        let (inbound_tx, inbound_rx) = flume::unbounded::<(Bytes, Vec<Bytes>)>();

        let hub = RouterHub::new(hub_rx, user_rx, RouterBehavior::LoadBalancer);
        let hub_task = compio::runtime::spawn(hub.run());

        Self {
            cmd_tx: user_tx,
            inbound_tx,
            inbound_rx,
            hub_tx,
            options,
            monitor: SharedMonitor::none(),
            _hub_task: hub_task,
        }
    }

    /// Attach a monitor channel to receive lifecycle events for this socket.
    ///
    /// Events emitted before the first call to `monitor()` are not
    /// buffered; call this before connecting peers if you need to observe
    /// every transition.
    pub fn monitor(&mut self) -> SocketMonitor {
        self.monitor.attach()
    }

    /// Connect to an additional peer; messages sent on this socket are
    /// round-robined across every connected peer.
    pub async fn add_endpoint(&self, addr: &str, config: BufferConfig) -> io::Result<()> {
        let stream = TcpStream::connect(addr).await?;
        zlink_core::tcp::enable_tcp_nodelay(&stream)?;
        let options = self
            .options
            .clone()
            .with_buffer_sizes(config.read_buf_size, config.write_buf_size);
        self.attach_peer(stream, addr, options).await
    }

    /// Connect to an additional peer over `tls://`.
    pub async fn add_endpoint_tls(&self, addr: &str) -> io::Result<()> {
        let stream = transport::connect_tls(addr, &self.options).await?;
        self.attach_peer(stream, addr, self.options.clone()).await
    }

    /// Connect to an additional peer over `ws://`.
    pub async fn add_endpoint_ws(&self, addr: &str, path: &str) -> io::Result<()> {
        let stream = transport::connect_ws(addr, path).await?;
        self.attach_peer(stream, addr, self.options.clone()).await
    }

    /// Connect to an additional peer over `wss://`.
    pub async fn add_endpoint_wss(&self, addr: &str, path: &str) -> io::Result<()> {
        let stream = transport::connect_wss(addr, path, &self.options).await?;
        self.attach_peer(stream, addr, self.options.clone()).await
    }

    /// Drive the HELLO/READY handshake over an already-established stream,
    /// register the new peer with the hub, and spawn its peer task.
    async fn attach_peer<S>(&self, mut stream: S, addr: &str, options: SocketOptions) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + 'static,
    {
        let endpoint = addr
            .parse()
            .map(Endpoint::Tcp)
            .or_else(|_| Endpoint::parse(addr))
            .unwrap_or_else(|_| Endpoint::Inproc(addr.to_string()));
        self.monitor.emit(SocketEvent::ConnectionReady(endpoint.clone()));

        let handshake_result = perform_handshake_with_timeout(
            &mut stream,
            SocketType::Dealer,
            Some(options.handshake_timeout),
        )
        .await
        .map_err(|e| {
            self.monitor.emit(SocketEvent::HandshakeFailed {
                endpoint: endpoint.clone(),
                reason: HandshakeFailure::Protocol,
            });
            io::Error::other(format!("Handshake failed: {}", e))
        })?;

        debug!(
            peer = %addr,
            peer_socket_type = %handshake_result.peer_socket_type,
            "[DEALER] connected"
        );
        self.monitor.emit(SocketEvent::Connected(endpoint.clone()));

        let routing_id = routing_id::generate();
        let send_hwm = options.send_hwm;
        let base = SocketBase::new(stream, SocketType::Dealer, options);
        let (peer_cmd_tx, peer_cmd_rx) = peer_channel(send_hwm);

        self.hub_tx
            .send(HubEvent::PeerUp {
                routing_id: routing_id.clone(),
                tx: peer_cmd_tx,
            })
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "dealer hub closed"))?;

        compio::runtime::spawn(run_peer(
            base,
            routing_id,
            self.inbound_tx.clone(),
            peer_cmd_rx,
            self.hub_tx.clone(),
            endpoint,
            self.monitor.clone(),
        ))
        .detach();

        Ok(())
    }

    /// Send a multipart message; the hub picks a peer via round robin.
    ///
    /// Fails with `ErrorKind::WouldBlock` once the picked peer's outbound
    /// queue is already at `send_hwm` capacity (§8 scenario 6); a socket
    /// with no connected peers drops the message silently, matching
    /// libzmq's DEALER behavior.
    pub async fn send(&self, msg: Vec<Bytes>) -> io::Result<()> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.cmd_tx
            .send_async(RouterCmd::SendMessage(msg, reply_tx))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "dealer hub closed"))?;
        match reply_rx
            .recv_async()
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "dealer hub closed"))?
        {
            SendOutcome::Delivered | SendOutcome::UnknownPeer => Ok(()),
            SendOutcome::WouldBlock => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "send HWM reached"))
            }
        }
    }

    /// Receive a multipart message, fair-queued from all connected peers.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        match self.inbound_rx.recv_async().await {
            Ok((_routing_id, body)) => Ok(Some(body)),
            Err(_) => Ok(None),
        }
    }

    /// Get the socket type.
    pub const fn socket_type(&self) -> SocketType {
        SocketType::Dealer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn test_dealer_unconnected() {
        let dealer = DealerSocket::new_unconnected(SocketOptions::default());
        assert_eq!(dealer.socket_type(), SocketType::Dealer);
    }
}
