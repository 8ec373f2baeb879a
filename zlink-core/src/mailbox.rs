//! Mailbox command set (§4.5): the tagged commands I/O threads, sessions,
//! and sockets exchange with each other.
//!
//! zlink models the mailbox as a `flume::Sender<Command>`/`Receiver<Command>`
//! pair per I/O thread, matching the teacher's `flume::unbounded()` channel
//! idiom used throughout `router.rs`/`pubsub/hub.rs` for hub/peer
//! coordination. `Command` generalizes that ad hoc per-module enum (`RouterCmd`,
//! `PubSubCmd`, `HubEvent`, ...) into the full tag set from spec.md §4.5 for
//! use by the context/I/O-thread-pool layer in the `zlink` crate.
//!
//! Thread-safe sockets (an explicit opt-in, default off per §4.3) additionally
//! guard every public API call with a `parking_lot::Mutex`; non-thread-safe
//! sockets forbid concurrent entry and rely on the mailbox signal alone to
//! wake a blocked `recv`.

use bytes::Bytes;

/// A handle identifying the target object a command applies to (a socket, a
/// session, or a pipe), scoped to one context. Kept as an opaque integer so
/// the mailbox never carries raw pointers/back-references (§9 Design Notes).
pub type ObjectHandle = u64;

/// Commands exchanged between user threads, I/O threads, sessions and
/// sockets via the mailbox.
#[derive(Debug, Clone)]
pub enum Command {
    /// Ask the target (I/O thread or session) to stop processing and exit.
    Stop,
    /// Attach a newly constructed object to its owner (session to socket,
    /// socket to I/O thread).
    Plug { target: ObjectHandle },
    /// Transfer ownership of a child object to the recipient (e.g. context
    /// handing a new session to an I/O thread).
    Own { child: ObjectHandle },
    /// Attach a pipe endpoint to its socket once a session's handshake
    /// completes.
    Attach { pipe: ObjectHandle },
    /// Request a listener bind on the target I/O thread.
    Bind { endpoint: String },
    /// Notify a writer that its pipe has drained below the low-water mark
    /// and may be written to again.
    ActivateRead { pipe: ObjectHandle },
    /// Notify a reader that new data is available on a pipe.
    ActivateWrite { pipe: ObjectHandle },
    /// Reconnect backoff elapsed; retry the connection.
    Hiccup,
    /// A pipe has been terminated (delimiter observed); notify the owner.
    PipeTerm { pipe: ObjectHandle },
    /// Acknowledge a previously received `PipeTerm`.
    PipeTermAck { pipe: ObjectHandle },
    /// Request termination of the target (propagates from `ctx_term`).
    TermReq { target: ObjectHandle },
    /// Unconditional terminate, used once linger has elapsed.
    Term,
    /// Acknowledge a `Term`/`TermReq`.
    TermAck { target: ObjectHandle },
    /// Ask the context's reaper to collect a fully-terminated object.
    Reap { target: ObjectHandle },
    /// The reaper has collected an object; safe to drop bookkeeping.
    Reaped { target: ObjectHandle },
    /// An `inproc://` connecter found its matching bind and is now linked.
    InprocConnected { endpoint: String },
    /// Final acknowledgement that a shutdown sequence completed.
    Done,
    /// Opaque application-defined payload (routing id + frames), used by the
    /// socket-pattern hubs (`RouterCmd`/`PubSubCmd` in this crate are kept
    /// as their own lighter-weight enums for the hot path; `Command::Data`
    /// exists so the generic context/I/O-thread layer can still forward
    /// payload without knowing the socket-pattern-specific shape).
    Data {
        routing_id: Option<Bytes>,
        frames: Vec<Bytes>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_cloneable_and_debuggable() {
        let cmd = Command::Data {
            routing_id: Some(Bytes::from_static(b"peer")),
            frames: vec![Bytes::from_static(b"hello")],
        };
        let cloned = cmd.clone();
        assert!(format!("{cloned:?}").contains("Data"));
    }

    #[test]
    fn stop_and_term_are_unit_variants() {
        let _ = Command::Stop;
        let _ = Command::Term;
        let _ = Command::Done;
    }
}
