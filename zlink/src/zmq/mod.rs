//! ZeroMQ protocol implementation.
//!
//! This module provides ZeroMQ-compatible sockets built on `io_uring`.
//!
//! # Socket Types
//!
//! - [`PairSocket`] - Exclusive two-way peer connection
//! - [`PubSocket`] / [`SubSocket`] - Publish/subscribe broadcast
//! - [`XPubSocket`] / [`XSubSocket`] - Extended pub/sub with subscription
//!   events (brokers, proxies)
//! - [`DealerSocket`] / [`RouterSocket`] - Asynchronous, identity-routed
//!   request-reply
//! - [`StreamSocket`] - Raw TCP bytes addressed by routing id
//!
//! # Quick Start
//!
//! ## DEALER / ROUTER
//!
//! ```rust,no_run
//! use zlink::zmq::{DealerSocket, RouterSocket};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut socket = DealerSocket::connect("127.0.0.1:5555").await?;
//! socket.send(vec![Bytes::from("REQUEST")]).await?;
//!
//! if let Some(reply) = socket.recv().await? {
//!     println!("Got reply: {:?}", reply);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ```rust,no_run
//! use zlink::zmq::RouterSocket;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut socket = RouterSocket::bind("127.0.0.1:5555").await?;
//!
//! while let Some(msg) = socket.recv().await? {
//!     socket.send(msg).await?; // Echo back
//! }
//! # Ok(())
//! # }
//! ```

mod common;
mod dealer;
mod pair;
mod publisher;
mod router;
mod stream;
mod subscriber;
mod xpub;
mod xsub;

// Re-export socket types
pub use dealer::DealerSocket;
pub use pair::PairSocket;
pub use publisher::PubSocket;
pub use router::RouterSocket;
pub use stream::StreamSocket;
pub use subscriber::SubSocket;
pub use xpub::XPubSocket;
pub use xsub::XSubSocket;

/// Convenient imports for ZeroMQ protocol.
///
/// # Example
///
/// ```rust
/// use zlink::zmq::prelude::*;
///
/// // Now you have:
/// // - PairSocket, DealerSocket, RouterSocket
/// // - PubSocket, SubSocket, XPubSocket, XSubSocket
/// // - StreamSocket
/// // - Bytes for zero-copy messages
/// ```
pub mod prelude {
    pub use super::{
        DealerSocket, PairSocket, PubSocket, RouterSocket, StreamSocket, SubSocket, XPubSocket,
        XSubSocket,
    };
    pub use bytes::Bytes;
}
