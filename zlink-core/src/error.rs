//! Error types shared across the zlink workspace.
//!
//! Follows the taxonomy in the protocol design: protocol errors (peer
//! violated the wire format), transport errors (connection reset), resource
//! errors (HWM reached), programmer errors (invalid argument/socket type),
//! and lifecycle errors (operating on a terminated context).

use std::io;
use thiserror::Error;

/// Main error type for zlink operations.
#[derive(Error, Debug)]
pub enum ZlinkError {
    /// IO error during socket operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error during handshake or framing (invalid magic, version
    /// mismatch, reserved bits set, oversized body, and similar).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Handshake timed out before HELLO/READY completed.
    #[error("Handshake timeout after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// Heartbeat timeout expired without a HEARTBEAT_ACK.
    #[error("Heartbeat timeout after {0:?}")]
    HeartbeatTimeout(std::time::Duration),

    /// Invalid frame format (magic/version/flags/body-length violation).
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Socket closed by the local side (`ctx_term`/explicit close).
    #[error("Socket closed")]
    SocketClosed,

    /// Context has been terminated; further operations are rejected.
    #[error("Context terminated")]
    Terminated,

    /// A blocking or non-blocking call could not proceed immediately
    /// (HWM reached, nothing queued, non-blocking mode).
    #[error("Operation would block")]
    WouldBlock,

    /// A blocking call was interrupted before completing.
    #[error("Operation interrupted")]
    Interrupted,

    /// Requested operation is not supported by this socket type/transport.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Programmer error: invalid argument (bad option value, bad endpoint).
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// Programmer error: handle does not refer to a live socket.
    #[error("Not a socket")]
    NotSocket,

    /// Channel send error (mailbox/pipe counterpart gone).
    #[error("Channel send error")]
    ChannelSend,

    /// Channel receive error (mailbox/pipe counterpart gone).
    #[error("Channel receive error")]
    ChannelRecv,

    /// Peer disconnected.
    #[error("Peer disconnected: {0}")]
    PeerDisconnected(String),

    /// Invalid routing identity (wrong length or reserved first byte).
    #[error("Invalid routing ID")]
    InvalidRoutingId,

    /// Message body exceeds the configured `maxmsgsize`.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Subscription trie/filter error.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// `ROUTER` could not find a pipe for the addressed routing id
    /// (`router_mandatory` is set; otherwise the message is dropped).
    #[error("Host unreachable")]
    HostUnreachable,
}

/// Result type alias for zlink operations.
pub type Result<T> = std::result::Result<T, ZlinkError>;

impl ZlinkError {
    /// Create a protocol error with a message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invalid frame error.
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Create a peer disconnected error.
    pub fn peer_disconnected(peer_id: impl Into<String>) -> Self {
        Self::PeerDisconnected(peer_id.into())
    }

    /// Check if this error is recoverable (caller may retry).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            Self::WouldBlock | Self::Interrupted => true,
            _ => false,
        }
    }

    /// Check if this is a connection-lifecycle error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::SocketClosed
                | Self::PeerDisconnected(_)
                | Self::HandshakeTimeout(_)
                | Self::HeartbeatTimeout(_)
        )
    }
}
