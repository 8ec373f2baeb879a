//! Pipe fabric (§4.1): the lock-free message pipe joining a socket to its
//! session.
//!
//! A pipe pair is two single-producer/single-consumer queues, one per
//! direction, created together with [`pair`]. Each endpoint enforces its own
//! outbound high-water mark and tracks the peer's read-side credit so that a
//! writer never queues more than the reader advertised capacity for.
//! Termination is a dual-delimiter handshake: each side, when closing, sends
//! a [`PipeEvent::Delimiter`] through the queue so it is seen in order with
//! any data already in flight; a side only frees its half after it has both
//! sent and observed a delimiter.
//!
//! Built on `flume` unbounded channels (matching the teacher's mailbox/hub
//! channel idiom throughout `router.rs`/`pubsub/hub.rs`) with HWM
//! enforcement layered on top, since `flume` itself has no backpressure.

use flume::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lifecycle state of one pipe endpoint (§3 Pipe invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    /// Normal operation.
    Active,
    /// Local side has sent its delimiter and is waiting to observe the
    /// peer's delimiter before it may free its half.
    WaitingForDelimiter,
    /// A delimiter has been read; no more data frames will be delivered.
    Terminating,
    /// Both delimiters observed; the pipe is fully closed.
    Terminated,
}

/// An item flowing through a pipe: either a user message or the
/// termination sentinel.
#[derive(Debug)]
pub enum PipeEvent<T> {
    /// A user-level message (data or control frame).
    Message(T),
    /// Termination sentinel; ordering with data is preserved because it
    /// travels through the same queue.
    Delimiter,
}

/// Errors a pipe endpoint can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PipeError {
    /// The pipe (or this direction of it) is closed; no further I/O is
    /// possible.
    #[error("pipe closed")]
    Closed,
    /// The outbound HWM would be exceeded; caller should retry or drop.
    #[error("pipe would block (HWM reached)")]
    WouldBlock,
}

/// Shared bookkeeping between the two halves of one pipe pair, used only for
/// the dual-delimiter termination handshake.
struct Shared {
    // Set when this endpoint has sent (enqueued) its delimiter.
    sent_delimiter: AtomicBool,
    // Set when this endpoint has observed the peer's delimiter.
    seen_peer_delimiter: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            sent_delimiter: AtomicBool::new(false),
            seen_peer_delimiter: AtomicBool::new(false),
        }
    }
}

/// One endpoint of a pipe: write to the peer, read from the peer.
///
/// `out_hwm` bounds how many messages this endpoint may have in flight
/// towards the peer before `write` starts returning
/// [`PipeError::WouldBlock`] (0 means unlimited). `credit` tracks the
/// reader-signalled capacity the *peer* end has granted this writer; it is
/// consumed on `write` and replenished by [`grant_credit`](Pipe::grant_credit)
/// once the peer has drained messages back below its low-water mark
/// (`in_hwm / 2`, matching libzmq's `lwm` behavior).
pub struct Pipe<T> {
    tx: Sender<PipeEvent<T>>,
    rx: Receiver<PipeEvent<T>>,
    out_hwm: usize,
    in_hwm: usize,
    credit: Arc<AtomicUsize>,
    // local termination bookkeeping: our half, and the peer's half
    local: Arc<Shared>,
    peer: Arc<Shared>,
    state: PipeState,
    read_closed_once: bool,
}

const UNLIMITED_CREDIT: usize = usize::MAX;

/// Create a connected pair of pipe endpoints.
///
/// `a_out_hwm`/`a_in_hwm` are the HWMs as seen from endpoint `a`'s
/// perspective (`a`'s outbound HWM is `b`'s inbound HWM and vice versa, as
/// the spec's pipe has one `out_hwm`/`in_hwm` pair per side).
#[must_use]
pub fn pair<T>(a_out_hwm: usize, a_in_hwm: usize) -> (Pipe<T>, Pipe<T>) {
    let (tx_a_to_b, rx_a_to_b) = flume::unbounded();
    let (tx_b_to_a, rx_b_to_a) = flume::unbounded();
    let shared_a = Arc::new(Shared::new());
    let shared_b = Arc::new(Shared::new());

    let credit_a = Arc::new(AtomicUsize::new(if a_in_hwm == 0 {
        UNLIMITED_CREDIT
    } else {
        a_in_hwm
    }));
    let credit_b = Arc::new(AtomicUsize::new(if a_out_hwm == 0 {
        UNLIMITED_CREDIT
    } else {
        a_out_hwm
    }));

    let a = Pipe {
        tx: tx_a_to_b,
        rx: rx_b_to_a,
        out_hwm: a_out_hwm,
        in_hwm: a_in_hwm,
        credit: credit_b.clone(),
        local: shared_a.clone(),
        peer: shared_b.clone(),
        state: PipeState::Active,
        read_closed_once: false,
    };
    let b = Pipe {
        tx: tx_b_to_a,
        rx: rx_a_to_b,
        out_hwm: a_in_hwm,
        in_hwm: a_out_hwm,
        credit: credit_a,
        local: shared_b,
        peer: shared_a,
        state: PipeState::Active,
        read_closed_once: false,
    };
    (a, b)
}

impl<T> Pipe<T> {
    /// Queue a message towards the peer.
    ///
    /// Returns [`PipeError::WouldBlock`] if `out_hwm` is nonzero and the
    /// peer has not yet granted credit (caller retries or, on PUB, drops
    /// per the spec's documented drop policy). Returns
    /// [`PipeError::Closed`] once this endpoint has been terminated.
    pub fn write(&self, msg: T) -> Result<(), PipeError> {
        if self.state != PipeState::Active {
            return Err(PipeError::Closed);
        }
        if self.out_hwm != 0 {
            let credit = self.credit.load(Ordering::Acquire);
            if credit == 0 {
                return Err(PipeError::WouldBlock);
            }
            self.credit.fetch_sub(1, Ordering::AcqRel);
        }
        self.tx
            .send(PipeEvent::Message(msg))
            .map_err(|_| PipeError::Closed)
    }

    /// Side-effect-free predicate usable from a `poll`-style loop.
    #[must_use]
    pub fn check_read(&self) -> bool {
        self.state == PipeState::Active && !self.rx.is_empty()
    }

    /// Side-effect-free predicate: would the next `write` succeed.
    #[must_use]
    pub fn check_write(&self) -> bool {
        self.state == PipeState::Active
            && (self.out_hwm == 0 || self.credit.load(Ordering::Acquire) > 0)
    }

    /// Pop the next available message.
    ///
    /// On reading the peer's delimiter the pipe transitions to
    /// `Terminating` and this returns `Ok(None)` exactly once; subsequent
    /// reads return [`PipeError::Closed`].
    pub fn read(&mut self) -> Result<Option<T>, PipeError> {
        if self.state == PipeState::Terminated {
            return Err(PipeError::Closed);
        }
        match self.rx.try_recv() {
            Ok(PipeEvent::Message(msg)) => {
                self.grant_credit();
                Ok(Some(msg))
            }
            Ok(PipeEvent::Delimiter) => {
                self.peer.seen_peer_delimiter.store(true, Ordering::Release);
                if self.state == PipeState::Active {
                    self.state = PipeState::Terminating;
                }
                self.maybe_finish_termination();
                if self.read_closed_once {
                    Err(PipeError::Closed)
                } else {
                    self.read_closed_once = true;
                    Ok(None)
                }
            }
            Err(TryRecvError::Empty) => {
                if self.state == PipeState::Active {
                    Ok(None)
                } else {
                    Err(PipeError::Closed)
                }
            }
            Err(TryRecvError::Disconnected) => Err(PipeError::Closed),
        }
    }

    /// Publish buffered writes and, if the reader is parked on the
    /// channel's `recv_async`, wake it. `flume` channels have no separate
    /// buffering stage so this is a no-op beyond documenting the call
    /// site the protocol layer expects (batched encoder writes call this
    /// once per batch rather than per message).
    pub fn flush(&self) {}

    /// Replenish the peer's write credit once this side has drained below
    /// its low-water mark (`in_hwm / 2`). Called automatically from
    /// `read`; exposed so a session can re-grant credit after draining a
    /// batch read from the transport.
    pub fn grant_credit(&self) {
        if self.in_hwm == 0 {
            return;
        }
        let lwm = (self.in_hwm / 2).max(1);
        if self.rx.len() <= lwm {
            self.credit.store(self.in_hwm, Ordering::Release);
        }
    }

    /// Initiate graceful close. If `send_delimiter`, enqueue a delimiter
    /// the peer must observe before it frees its half; otherwise this side
    /// enters `Terminating` immediately without waiting on the peer.
    pub fn terminate(&mut self, send_delimiter: bool) {
        if self.state == PipeState::Terminated {
            return;
        }
        if send_delimiter && !self.local.sent_delimiter.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(PipeEvent::Delimiter);
        }
        if self.state == PipeState::Active {
            self.state = PipeState::WaitingForDelimiter;
        }
        self.maybe_finish_termination();
    }

    fn maybe_finish_termination(&mut self) {
        if self.state == PipeState::Terminated {
            return;
        }
        if self.local.sent_delimiter.load(Ordering::Acquire)
            && self.local.seen_peer_delimiter.load(Ordering::Acquire)
        {
            self.state = PipeState::Terminated;
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PipeState {
        self.state
    }

    /// Reconfigure HWMs (socket option change before traffic starts).
    pub fn set_hwm(&mut self, out_hwm: usize, in_hwm: usize) {
        self.out_hwm = out_hwm;
        self.in_hwm = in_hwm;
        self.credit.store(
            if out_hwm == 0 { UNLIMITED_CREDIT } else { out_hwm },
            Ordering::Release,
        );
    }

    /// Placeholder hook mirroring the spec's `set_nodelay` pipe config
    /// knob; zlink's transports enable `TCP_NODELAY` at the socket level
    /// (`zlink_core::tcp::enable_tcp_nodelay`), so this is a no-op kept
    /// for API parity with §4.1.
    pub const fn set_nodelay(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_echo_roundtrip() {
        let (mut a, mut b) = pair::<u32>(0, 0);
        a.write(1).unwrap();
        a.write(2).unwrap();
        assert_eq!(b.read().unwrap(), Some(1));
        assert_eq!(b.read().unwrap(), Some(2));
        assert_eq!(b.read().unwrap(), None);
    }

    #[test]
    fn hwm_blocks_writer_without_credit() {
        let (a, _b) = pair::<u32>(2, 2);
        a.write(1).unwrap();
        a.write(2).unwrap();
        assert_eq!(a.write(3), Err(PipeError::WouldBlock));
    }

    #[test]
    fn reading_replenishes_credit_below_low_water_mark() {
        let (a, mut b) = pair::<u32>(2, 2);
        a.write(1).unwrap();
        a.write(2).unwrap();
        assert_eq!(a.write(3), Err(PipeError::WouldBlock));
        b.read().unwrap();
        assert!(a.check_write());
        a.write(3).unwrap();
    }

    #[test]
    fn dual_delimiter_termination() {
        let (mut a, mut b) = pair::<u32>(0, 0);
        a.write(42).unwrap();
        a.terminate(true);
        assert_eq!(b.read().unwrap(), Some(42));
        assert_eq!(b.read().unwrap(), None); // delimiter observed once
        assert_eq!(b.read(), Err(PipeError::Closed));
        b.terminate(true);
        assert_eq!(a.state(), PipeState::Terminated);
        assert_eq!(b.state(), PipeState::Terminated);
    }

    #[test]
    fn write_after_terminate_fails() {
        let (mut a, _b) = pair::<u32>(0, 0);
        a.terminate(false);
        assert_eq!(a.write(1), Err(PipeError::Closed));
    }
}
