//! zlink-core
//!
//! Runtime-agnostic core building blocks shared by the ZMP protocol layer
//! (`zlink-proto`) and the public API (`zlink`):
//! - Pinned / io_uring-safe allocation (`alloc`)
//! - Credit-backed SPSC pipe fabric (`pipe`)
//! - ROUTER peer map (`router`)
//! - PUB/SUB subscription trie + hub (`pubsub`, `subscription`)
//! - Message representation (`message`, `message_builder`)
//! - Socket options, endpoints, transports (`options`, `endpoint`, `tcp`,
//!   `ipc`, `inproc`)
//! - Error types (`error`)
//! - Monitor event stream (`monitor`)
//! - Reconnect/backoff state machine (`reconnect`)
//! - Cancellation-safety guard for in-flight I/O (`poison`)
//! - Socket type enum and compatibility table (`socket_type`)
//! - Heartbeat/handshake timeout tracking (`timeout`)
//! - Mailbox commands and I/O-thread context lifecycle (`mailbox`, `context`)

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]

pub mod alloc;
pub mod buffer;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod inproc;
pub mod ipc;
pub mod mailbox;
pub mod message;
pub mod message_builder;
pub mod monitor;
pub mod options;
pub mod pipe;
pub mod poison;
pub mod reconnect;
pub mod router;
pub mod socket_type;
pub mod subscription;
pub mod tcp;
pub mod timeout;

pub mod pubsub {
    pub mod hub;
    pub mod index;
}

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::alloc::{IoArena, SlabMut};
    pub use crate::error::{Result, ZlinkError};
    pub use crate::mailbox::Command;
    pub use crate::message::Message;
    pub use crate::options::SocketOptions;
    pub use crate::pipe::{Pipe, PipeError, PipeEvent, PipeState};
    pub use crate::pubsub::hub::{PubSubCmd, PubSubEvent, PubSubHub};
    pub use crate::pubsub::index::{PeerKey, SubscriptionIndex};
    pub use crate::router::{HubEvent, PeerCmd, RouterBehavior, RouterCmd, RouterHub};
    pub use crate::socket_type::SocketType;
}
