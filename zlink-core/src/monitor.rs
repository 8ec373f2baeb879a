//! Socket event monitoring (§6 "Monitor event stream").
//!
//! Provides event streams for tracking socket lifecycle events like
//! connections, disconnections, and handshake failures. A socket's
//! `monitor()` method hands out a [`SocketMonitor`] receiver; the matching
//! [`SocketEventSender`] is held by the socket's background tasks (accept
//! loop, peer tasks) behind a [`SharedMonitor`] so it can be attached after
//! construction without threading a channel through every constructor.

use crate::endpoint::Endpoint;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Why a handshake failed, mirroring libzmq's `handshake_failed_*` monitor
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFailure {
    /// No further detail available (e.g. the peer closed before HELLO).
    NoDetail,
    /// A ZMP protocol violation (bad magic/version/flags, socket-type
    /// mismatch, or a timed-out handshake).
    Protocol,
    /// TLS/credential validation failed.
    Auth,
}

impl fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDetail => write!(f, "no detail"),
            Self::Protocol => write!(f, "protocol"),
            Self::Auth => write!(f, "auth"),
        }
    }
}

/// Socket lifecycle events (§6).
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// Transport-level connect succeeded; ZMP handshake has not run yet.
    ConnectionReady(Endpoint),

    /// Socket successfully connected to a peer (handshake complete).
    Connected(Endpoint),

    /// Socket disconnected from a peer.
    Disconnected(Endpoint),

    /// Socket successfully bound to an endpoint.
    Bound(Endpoint),

    /// Bind operation failed.
    BindFailed { endpoint: Endpoint, reason: String },

    /// Connection attempt failed.
    ConnectFailed { endpoint: Endpoint, reason: String },

    /// Socket is listening for incoming connections.
    Listening(Endpoint),

    /// Socket accepted a new incoming connection.
    Accepted(Endpoint),

    /// Handshake with a peer failed.
    HandshakeFailed {
        endpoint: Endpoint,
        reason: HandshakeFailure,
    },

    /// Peer failed to ACK a HEARTBEAT within `heartbeat_timeout`.
    HeartbeatTimeout(Endpoint),

    /// Closing a connection/listener failed.
    CloseFailed { endpoint: Endpoint, reason: String },

    /// The monitor channel itself is being torn down (socket dropped).
    MonitorStopped,
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionReady(ep) => write!(f, "Connection ready on {ep}"),
            Self::Connected(ep) => write!(f, "Connected to {ep}"),
            Self::Disconnected(ep) => write!(f, "Disconnected from {ep}"),
            Self::Bound(ep) => write!(f, "Bound to {ep}"),
            Self::BindFailed { endpoint, reason } => {
                write!(f, "Bind failed for {endpoint}: {reason}")
            }
            Self::ConnectFailed { endpoint, reason } => {
                write!(f, "Connect failed for {endpoint}: {reason}")
            }
            Self::Listening(ep) => write!(f, "Listening on {ep}"),
            Self::Accepted(ep) => write!(f, "Accepted connection from {ep}"),
            Self::HandshakeFailed { endpoint, reason } => {
                write!(f, "Handshake failed for {endpoint} ({reason})")
            }
            Self::HeartbeatTimeout(ep) => write!(f, "Heartbeat timeout on {ep}"),
            Self::CloseFailed { endpoint, reason } => {
                write!(f, "Close failed for {endpoint}: {reason}")
            }
            Self::MonitorStopped => write!(f, "Monitor stopped"),
        }
    }
}

/// Handle for receiving socket events.
///
/// This is a channel receiver that provides a stream of socket lifecycle events.
pub type SocketMonitor = flume::Receiver<SocketEvent>;

/// Internal sender for socket events.
///
/// This is exposed publicly to allow socket implementations to emit events.
pub type SocketEventSender = flume::Sender<SocketEvent>;

/// Creates a new monitoring channel pair.
///
/// This is exposed publicly to allow socket implementations to create monitors.
#[must_use]
pub fn create_monitor() -> (SocketEventSender, SocketMonitor) {
    flume::unbounded()
}

/// A monitor sender that can be attached to a socket after its background
/// tasks have already been spawned.
///
/// Socket constructors clone a `SharedMonitor` into every accept loop and
/// peer task up front; `monitor()` just fills in the `Option` under the
/// lock, so events emitted by tasks spawned before `monitor()` was called
/// are still delivered to whichever receiver ends up attached.
#[derive(Clone, Default)]
pub struct SharedMonitor(Arc<Mutex<Option<SocketEventSender>>>);

impl SharedMonitor {
    /// A shared monitor slot with no sender attached yet.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Attach a fresh sender, discarding any previous one, and return its
    /// receiver.
    pub fn attach(&self) -> SocketMonitor {
        let (tx, rx) = create_monitor();
        *self.0.lock() = Some(tx);
        rx
    }

    /// Emit an event if a receiver is attached; silently dropped otherwise.
    pub fn emit(&self, event: SocketEvent) {
        if let Some(tx) = self.0.lock().as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl fmt::Debug for SharedMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMonitor")
            .field("attached", &self.0.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn test_socket_event_display() {
        let addr: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        let event = SocketEvent::Connected(Endpoint::Tcp(addr));
        assert_eq!(event.to_string(), "Connected to tcp://127.0.0.1:5555");
    }

    #[test]
    fn test_monitor_channel() {
        let (sender, receiver) = create_monitor();
        let addr: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        sender.send(SocketEvent::Connected(Endpoint::Tcp(addr))).unwrap();
        
        let event = receiver.recv().unwrap();
        assert!(matches!(event, SocketEvent::Connected(_)));
    }
}
