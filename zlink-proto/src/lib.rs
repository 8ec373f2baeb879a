//! # zlink-proto
//!
//! **Internal protocol implementation crate for zlink.**
//!
//! This is an internal implementation detail — use the `zlink` crate for the
//! public API surface. `zlink-proto` carries the ZMP wire codec (§4.2), the
//! HELLO/READY/HEARTBEAT/ERROR handshake (§4.4), and the per-socket-type
//! state machines (§4.3: PAIR, PUB/SUB, XPUB/XSUB, DEALER, ROUTER, STREAM)
//! built on top of `SocketBase`.
//!
//! ## Socket types (internal API)
//!
//! - **PAIR**: exclusive one-to-one connection.
//! - **DEALER** / **ROUTER**: fair-queued, identity-addressed routing.
//! - **PUB** / **SUB**: broadcast with prefix-filtered subscriptions.
//! - **XPUB** / **XSUB**: PUB/SUB variants that surface/forward raw
//!   subscription control frames.
//! - **STREAM**: raw per-peer byte stream with connect/disconnect framing.
//!
//! ## For application development
//!
//! ```toml
//! [dependencies]
//! zlink = { version = "0.1", features = ["zmq"] }
//! ```
//!
//! ```rust,ignore
//! use zlink::zmq::DealerSocket;
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut socket = DealerSocket::connect("127.0.0.1:5555").await?;
//!     socket.send(vec![b"Hello!".into()]).await?;
//!     let response = socket.recv().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Zero-copy**: messages use `Bytes` for efficient sharing.
//! - **`io_uring`**: high-performance async I/O via `compio`.
//! - **Sans-IO codec**: the ZMP encoder/decoder are pure state machines,
//!   independent of the transport driving them.
//! - **Type-safe**: no unsafe code in the protocol layer.
//! - **Interoperable**: wire-compatible with the ZMP framing this spec
//!   defines (not legacy ZMTP).

// Allow some pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_async)]
#![allow(clippy::let_underscore_future)]
#![allow(clippy::future_not_send)] // Runtime-agnostic design
#![allow(clippy::uninlined_format_args)] // Style preference
#![allow(clippy::missing_errors_doc)] // Will add gradually
#![allow(clippy::doc_markdown)] // Too many false positives
#![allow(clippy::while_let_loop)] // Sometimes clearer as explicit loop
#![allow(clippy::option_if_let_else)] // Sometimes clearer as if/else
#![allow(clippy::never_loop)] // State machines use loop with early returns

// Shared socket I/O plumbing (not part of the public API).
pub mod base;

// Wire codec and control-message framing.
pub mod codec;
pub mod command;
pub mod handshake;

// Routing-id allocation (§3: 5-byte zero-prefixed auto ids).
pub mod routing_id;

// Shared socket capability trait (§4.3: xsend/xrecv/xhas_in/xhas_out/...).
pub mod socket_trait;
pub use socket_trait::Socket;

// In-process transport glue used by `inproc://` endpoints.
pub mod inproc_stream;

// TLS transport adapter (`tls://`, inner leg of `wss://`).
pub mod tls;

// WebSocket transport adapter (`ws://`, `wss://`).
pub mod ws;

// Shared connect/accept helpers layering TLS/WS on top of a TCP socket.
pub(crate) mod transport;

// Socket-type state machines.
pub mod dealer;
pub mod pair;
pub mod publisher;
pub mod router;
pub mod stream;
pub mod subscriber;
pub mod xpub;
pub mod xsub;

// Re-export socket types for a clean API.
pub use dealer::DealerSocket;
pub use pair::PairSocket;
pub use publisher::PubSocket;
pub use router::RouterSocket;
pub use stream::StreamSocket;
pub use subscriber::SubSocket;
pub use xpub::XPubSocket;
pub use xsub::XSubSocket;

pub use zlink_core::config::BufferConfig;
pub use zlink_core::socket_type::SocketType;

/// Prelude module for convenient imports.
///
/// ```rust
/// use zlink_proto::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        DealerSocket, PairSocket, PubSocket, RouterSocket, StreamSocket, SubSocket, XPubSocket,
        XSubSocket,
    };
    pub use bytes::Bytes;
    pub use zlink_core::socket_type::SocketType;
}
