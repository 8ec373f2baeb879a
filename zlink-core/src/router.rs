//! ROUTER Hub (Phase 2.1)
//!
//! Goals:
//! - Runtime-agnostic async loop (flume::select!, no tokio)
//! - Strict types: RouterCmd has envelope, PeerCmd is body-only
//! - Envelope normalization:
//!     inbound (actor->user) is normalized elsewhere to [ID, Body...] (§4.3)
//!     outbound (user->hub) accepts [ID, (Empty), Body...] in Standard mode,
//!     tolerating a REQ/REP-style empty delimiter frame if the caller sends one
//! - Load balancer mode: round-robin dispatch when no explicit routing id is used
//! - "Ghost peer" self-heal: stale IDs removed from rr list when detected

use bytes::Bytes;
use flume::{Receiver, Sender, TrySendError};
use hashbrown::HashMap;

/// Commands sent from application to Router Hub
#[derive(Debug)]
pub enum RouterCmd {
    /// Send a message (with routing envelope in Standard mode, or body-only
    /// in LB mode), replying on `reply` with the outcome so the caller can
    /// enforce HWM backpressure synchronously.
    SendMessage(Vec<Bytes>, Sender<SendOutcome>),
    /// Close all peers
    Close,
}

/// Result of routing one outbound message to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed off to the target peer's outbound queue.
    Delivered,
    /// Standard mode: no peer is known for that routing id. LoadBalancer
    /// mode: no peers are currently connected. Non-mandatory callers treat
    /// this as a silent drop; `ZMQ_ROUTER_MANDATORY` callers treat it as an
    /// error.
    UnknownPeer,
    /// A peer was found but its outbound queue is already at `send_hwm`
    /// capacity; the caller should report `would_block`.
    WouldBlock,
}

/// Create the bounded (or unbounded, if `send_hwm == 0`) channel a peer task
/// reads outbound `PeerCmd`s from. The channel's capacity *is* the pipe's
/// high-water mark (§4.1): once it holds `send_hwm` messages, `try_send`
/// returns `Full` and the caller is told to back off, exactly the "a pipe
/// whose HWM is `h` holds at most `h` messages" invariant.
#[must_use]
pub fn peer_channel(send_hwm: usize) -> (Sender<PeerCmd>, Receiver<PeerCmd>) {
    if send_hwm == 0 {
        flume::unbounded()
    } else {
        flume::bounded(send_hwm)
    }
}

/// Commands sent from Hub -> Peer Actor (body only; hub strips any envelope)
#[derive(Debug)]
pub enum PeerCmd {
    SendBody(Vec<Bytes>),
    Close,
}

/// Events sent from Peer Actor -> Hub (lifecycle)
#[derive(Debug)]
pub enum HubEvent {
    PeerUp {
        routing_id: Bytes, // Owned + stable
        tx: Sender<PeerCmd>,
    },
    PeerDown {
        routing_id: Bytes,
    },
}

/// Router behavior modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterBehavior {
    /// Standard ROUTER: expects user outbound as [ID, (Empty), Body...]
    /// If ID is unknown, drop silently (libzmq behavior).
    Standard,

    /// Load balancer: expects user outbound as [Body...]
    /// Hub picks a peer using strict-ish RR.
    LoadBalancer,
}

/// The Router Supervisor.
///
/// This runs once per ROUTER socket (listener), and coordinates N peer actors.
pub struct RouterHub {
    // routing table
    peers: HashMap<Bytes, Sender<PeerCmd>>,

    // LB rotation list (routing IDs)
    lb_list: Vec<Bytes>,
    lb_cursor: usize,
    behavior: RouterBehavior,

    /// ZMQ_ROUTER_HANDOVER: when true, a new connection presenting an
    /// already-connected routing id takes over the identity (the stale
    /// connection is closed). When false, the new connection is rejected
    /// and the existing one is kept (libzmq's default).
    handover: bool,

    // channels
    hub_rx: Receiver<HubEvent>,
    user_tx_rx: Receiver<RouterCmd>,
}

impl RouterHub {
    pub fn new(
        hub_rx: Receiver<HubEvent>,
        user_tx_rx: Receiver<RouterCmd>,
        behavior: RouterBehavior,
    ) -> Self {
        Self::with_handover(hub_rx, user_tx_rx, behavior, false)
    }

    pub fn with_handover(
        hub_rx: Receiver<HubEvent>,
        user_tx_rx: Receiver<RouterCmd>,
        behavior: RouterBehavior,
        handover: bool,
    ) -> Self {
        Self {
            peers: HashMap::new(),
            lb_list: Vec::new(),
            lb_cursor: 0,
            behavior,
            handover,
            hub_rx,
            user_tx_rx,
        }
    }

    pub async fn run(mut self) {
        use futures::select;
        use futures::FutureExt;

        loop {
            // Use futures::select! for runtime-agnostic multiplexing
            select! {
                msg = self.hub_rx.recv_async().fuse() => {
                    match msg {
                        Ok(ev) => self.handle_peer_event(ev),
                        Err(_) => break, // channel closed
                    }
                }
                msg = self.user_tx_rx.recv_async().fuse() => {
                    match msg {
                        Ok(cmd) => self.handle_user_cmd(cmd),
                        Err(_) => break, // channel closed
                    }
                }
            }
        }

        // Best-effort: close all peers on hub shutdown.
        for tx in self.peers.values() {
            let _ = tx.send(PeerCmd::Close);
        }
    }

    fn handle_peer_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::PeerUp { routing_id, tx } => {
                if let Some(existing) = self.peers.get(&routing_id) {
                    if !self.handover {
                        // Reject the newcomer; keep the existing connection.
                        let _ = tx.send(PeerCmd::Close);
                        return;
                    }
                    // Handover: the new connection takes over the identity;
                    // tell the stale one to go away.
                    let _ = existing.send(PeerCmd::Close);
                    if let Some(pos) = self.lb_list.iter().position(|x| x == &routing_id) {
                        self.lb_list.remove(pos);
                        if self.lb_cursor >= self.lb_list.len() {
                            self.lb_cursor = 0;
                        }
                    }
                }

                // Move routing_id into lb_list, clone for peers map
                self.lb_list.push(routing_id.clone());
                self.peers.insert(routing_id, tx);
            }

            HubEvent::PeerDown { routing_id } => {
                self.peers.remove(&routing_id);

                // Remove from LB list (O(N) but churn is not hot-path).
                if let Some(pos) = self.lb_list.iter().position(|x| x == &routing_id) {
                    self.lb_list.remove(pos);
                    if self.lb_cursor >= self.lb_list.len() {
                        self.lb_cursor = 0;
                    }
                }
            }
        }
    }

    fn handle_user_cmd(&mut self, cmd: RouterCmd) {
        match cmd {
            RouterCmd::SendMessage(parts, reply) => {
                let outcome = self.route_outbound(parts);
                let _ = reply.send(outcome);
            }
            RouterCmd::Close => {
                // broadcast close to peers
                for tx in self.peers.values() {
                    let _ = tx.send(PeerCmd::Close);
                }
            }
        }
    }

    /// Self-healing Round Robin peer selection.
    ///
    /// Returns a routing id that is present in `peers`, while repairing stale entries in `lb_list`.
    fn pick_rr_peer(&mut self) -> Option<Bytes> {
        let mut attempts = 0usize;
        let max_attempts = self.lb_list.len();

        while !self.lb_list.is_empty() && attempts <= max_attempts {
            if self.lb_cursor >= self.lb_list.len() {
                self.lb_cursor = 0;
            }

            let id = self.lb_list[self.lb_cursor].clone();
            // advance cursor for next pick
            self.lb_cursor = (self.lb_cursor + 1) % self.lb_list.len();

            if self.peers.contains_key(&id) {
                return Some(id);
            }

            // stale entry => repair
            if let Some(pos) = self.lb_list.iter().position(|x| x == &id) {
                self.lb_list.remove(pos);
                // cursor might now be out of bounds; loop header fixes it.
            }

            attempts += 1;
        }

        None
    }

    /// Routes an outbound message to its target peer.
    ///
    /// [`SendOutcome::UnknownPeer`] covers an unknown routing id in
    /// `Standard` mode or no peers at all in `LoadBalancer` mode.
    /// [`SendOutcome::WouldBlock`] means a peer was found but its outbound
    /// queue (capacity `send_hwm`) is already full.
    fn route_outbound(&mut self, mut parts: Vec<Bytes>) -> SendOutcome {
        if parts.is_empty() {
            return SendOutcome::UnknownPeer;
        }

        match self.behavior {
            RouterBehavior::Standard => {
                // Expect: [ID, (Empty), Body...]
                // NOTE: `remove(0)` is O(n), but this is hub-path, not IO hot loop.
                let target_id = parts.remove(0);

                // Normalize: drop optional empty delimiter frame
                if !parts.is_empty() && parts[0].is_empty() {
                    parts.remove(0);
                }

                let Some(tx) = self.peers.get(&target_id) else {
                    // ZMQ behavior: silently drop if unknown id, unless the
                    // caller asked for mandatory delivery (checked by the
                    // caller against this outcome).
                    return SendOutcome::UnknownPeer;
                };
                Self::send_to_peer(tx, parts)
            }

            RouterBehavior::LoadBalancer => {
                // Expect: [Body...]
                let Some(id) = self.pick_rr_peer() else {
                    return SendOutcome::UnknownPeer;
                };
                let Some(tx) = self.peers.get(&id) else {
                    return SendOutcome::UnknownPeer;
                };
                Self::send_to_peer(tx, parts)
            }
        }
    }

    fn send_to_peer(tx: &Sender<PeerCmd>, parts: Vec<Bytes>) -> SendOutcome {
        match tx.try_send(PeerCmd::SendBody(parts)) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => SendOutcome::WouldBlock,
            // Peer task already gone; treat like an unknown/unreachable peer.
            Err(TrySendError::Disconnected(_)) => SendOutcome::UnknownPeer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 scenario 6: a DEALER with `sndhwm=10` connected to a peer that
    /// never drains its queue must see its 11th non-blocking send report
    /// `would_block`, not succeed or silently drop.
    #[test]
    fn load_balancer_send_reports_would_block_once_peer_queue_is_full() {
        let (_hub_tx, hub_rx) = flume::unbounded::<HubEvent>();
        let (_user_tx, user_rx) = flume::unbounded::<RouterCmd>();
        let mut hub = RouterHub::new(hub_rx, user_rx, RouterBehavior::LoadBalancer);

        // A peer whose outbound queue (capacity 10, the scenario's sndhwm)
        // is never drained, standing in for a silent ROUTER peer.
        let (peer_cmd_tx, _peer_cmd_rx) = peer_channel(10);
        hub.handle_peer_event(HubEvent::PeerUp {
            routing_id: Bytes::from_static(b"peer"),
            tx: peer_cmd_tx,
        });

        for n in 0..10u8 {
            assert_eq!(
                hub.route_outbound(vec![Bytes::from(vec![n])]),
                SendOutcome::Delivered
            );
        }
        assert_eq!(
            hub.route_outbound(vec![Bytes::from_static(b"eleventh")]),
            SendOutcome::WouldBlock
        );
    }

    /// `send_hwm == 0` means unlimited: the channel is unbounded and every
    /// send is delivered regardless of how far behind the peer falls.
    #[test]
    fn zero_send_hwm_never_blocks() {
        let (_hub_tx, hub_rx) = flume::unbounded::<HubEvent>();
        let (_user_tx, user_rx) = flume::unbounded::<RouterCmd>();
        let mut hub = RouterHub::new(hub_rx, user_rx, RouterBehavior::LoadBalancer);

        let (peer_cmd_tx, _peer_cmd_rx) = peer_channel(0);
        hub.handle_peer_event(HubEvent::PeerUp {
            routing_id: Bytes::from_static(b"peer"),
            tx: peer_cmd_tx,
        });

        for n in 0..50u8 {
            assert_eq!(
                hub.route_outbound(vec![Bytes::from(vec![n])]),
                SendOutcome::Delivered
            );
        }
    }

    /// Standard ROUTER mode: an unknown routing id is reported distinctly
    /// from a full queue, so mandatory-delivery callers can tell them apart.
    #[test]
    fn standard_mode_unknown_routing_id_is_not_would_block() {
        let (_hub_tx, hub_rx) = flume::unbounded::<HubEvent>();
        let (_user_tx, user_rx) = flume::unbounded::<RouterCmd>();
        let mut hub = RouterHub::new(hub_rx, user_rx, RouterBehavior::Standard);

        let outcome = hub.route_outbound(vec![
            Bytes::from_static(b"no-such-peer"),
            Bytes::from_static(b"body"),
        ]);
        assert_eq!(outcome, SendOutcome::UnknownPeer);
    }
}
