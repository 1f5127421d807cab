//! Network seam — what the exchange needs from the transport.
//!
//! Dialing, security and framing live behind these traits. The coordinator
//! only ever sees peers, senders and messages.

use std::time::Duration;

use async_trait::async_trait;
use exchange_core::{PeerId, WantMessage};

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("peer {0} is unreachable")]
    Unreachable(PeerId),

    #[error("connecting to {0} timed out after {1:?}")]
    ConnectTimeout(PeerId, Duration),

    #[error("sender to {0} is closed")]
    SenderClosed(PeerId),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Connection-level access to remote peers.
#[async_trait]
pub trait NetworkPort: Send + Sync + 'static {
    /// Make sure a connection to `peer` exists. Callers bound this with their
    /// own timeout.
    async fn connect_to(&self, peer: &PeerId) -> Result<(), NetworkError>;

    /// Open a long-lived message stream to `peer`.
    async fn new_message_sender(&self, peer: &PeerId)
        -> Result<Box<dyn MessageSender>, NetworkError>;

    /// One-shot send, used for blocks.
    async fn send_message(&self, peer: &PeerId, message: WantMessage) -> Result<(), NetworkError>;
}

/// An open message stream to one peer.
#[async_trait]
pub trait MessageSender: Send {
    async fn send(&mut self, message: &WantMessage) -> Result<(), NetworkError>;

    async fn close(&mut self);
}
