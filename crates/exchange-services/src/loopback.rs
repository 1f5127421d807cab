//! In-memory network — records what would have gone on the wire.
//!
//! Used to drive the coordinator without a transport. Peers can be made
//! unreachable or slow to connect, and senders can be told to fail their
//! next sends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use exchange_core::{Block, PeerId, WantMessage};

use crate::network::{MessageSender, NetworkError, NetworkPort};

#[derive(Default)]
struct LoopbackState {
    /// Want-list messages delivered through senders, per peer.
    delivered: DashMap<PeerId, Vec<WantMessage>>,
    /// Blocks delivered through one-shot sends, per peer.
    blocks: DashMap<PeerId, Vec<Block>>,
    /// Sender sends still to fail, per peer.
    failing_sends: DashMap<PeerId, usize>,
    unreachable: DashMap<PeerId, ()>,
    connect_delay: DashMap<PeerId, Duration>,
    connects_in_flight: DashMap<PeerId, usize>,
    senders_opened: DashMap<PeerId, usize>,
    senders_closed: DashMap<PeerId, usize>,
    fail_one_shot: AtomicBool,
}

#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<LoopbackState>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` sender sends to `peer` fail.
    pub fn fail_next_sends(&self, peer: PeerId, count: usize) {
        self.state.failing_sends.insert(peer, count);
    }

    pub fn set_unreachable(&self, peer: PeerId, unreachable: bool) {
        if unreachable {
            self.state.unreachable.insert(peer, ());
        } else {
            self.state.unreachable.remove(&peer);
        }
    }

    /// Make `connect_to(peer)` take `delay` before succeeding. `None` removes it.
    pub fn set_connect_delay(&self, peer: PeerId, delay: Option<Duration>) {
        match delay {
            Some(delay) => {
                self.state.connect_delay.insert(peer, delay);
            }
            None => {
                self.state.connect_delay.remove(&peer);
            }
        }
    }

    /// Connects to `peer` currently waiting out their delay.
    pub fn connects_in_flight(&self, peer: &PeerId) -> usize {
        self.state
            .connects_in_flight
            .get(peer)
            .map(|n| *n)
            .unwrap_or(0)
    }

    /// Make every one-shot `send_message` fail.
    pub fn fail_one_shot_sends(&self, fail: bool) {
        self.state.fail_one_shot.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self, peer: &PeerId) -> Vec<WantMessage> {
        self.state
            .delivered
            .get(peer)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn blocks(&self, peer: &PeerId) -> Vec<Block> {
        self.state
            .blocks
            .get(peer)
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn senders_opened(&self, peer: &PeerId) -> usize {
        self.state.senders_opened.get(peer).map(|n| *n).unwrap_or(0)
    }

    pub fn senders_closed(&self, peer: &PeerId) -> usize {
        self.state.senders_closed.get(peer).map(|n| *n).unwrap_or(0)
    }

    fn check_reachable(&self, peer: &PeerId) -> Result<(), NetworkError> {
        if self.state.unreachable.contains_key(peer) {
            return Err(NetworkError::Unreachable(*peer));
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkPort for LoopbackNetwork {
    async fn connect_to(&self, peer: &PeerId) -> Result<(), NetworkError> {
        self.check_reachable(peer)?;
        let delay = self.state.connect_delay.get(peer).map(|d| *d);
        if let Some(delay) = delay {
            let _in_flight = InFlight::enter(self.state.clone(), *peer);
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn new_message_sender(
        &self,
        peer: &PeerId,
    ) -> Result<Box<dyn MessageSender>, NetworkError> {
        self.check_reachable(peer)?;
        *self.state.senders_opened.entry(*peer).or_default() += 1;
        Ok(Box::new(LoopbackSender {
            peer: *peer,
            state: self.state.clone(),
            closed: false,
        }))
    }

    async fn send_message(&self, peer: &PeerId, message: WantMessage) -> Result<(), NetworkError> {
        self.check_reachable(peer)?;
        if self.state.fail_one_shot.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("one-shot send refused".into()));
        }
        self.state
            .blocks
            .entry(*peer)
            .or_default()
            .extend(message.blocks().iter().cloned());
        Ok(())
    }
}

/// Counts a connect as in flight until its future finishes or is dropped.
struct InFlight {
    state: Arc<LoopbackState>,
    peer: PeerId,
}

impl InFlight {
    fn enter(state: Arc<LoopbackState>, peer: PeerId) -> Self {
        *state.connects_in_flight.entry(peer).or_default() += 1;
        Self { state, peer }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(mut n) = self.state.connects_in_flight.get_mut(&self.peer) {
            *n = n.saturating_sub(1);
        }
    }
}

struct LoopbackSender {
    peer: PeerId,
    state: Arc<LoopbackState>,
    closed: bool,
}

#[async_trait]
impl MessageSender for LoopbackSender {
    async fn send(&mut self, message: &WantMessage) -> Result<(), NetworkError> {
        if self.closed {
            return Err(NetworkError::SenderClosed(self.peer));
        }
        if let Some(mut remaining) = self.state.failing_sends.get_mut(&self.peer) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(NetworkError::Transport("stream reset".into()));
            }
        }
        self.state
            .delivered
            .entry(self.peer)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            *self.state.senders_closed.entry(self.peer).or_default() += 1;
        }
    }
}
