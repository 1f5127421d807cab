//! Block envelopes — a block bound for one peer plus a completion hook.
//!
//! The hook runs exactly once: when `sent()` is called, or when the envelope
//! is dropped without it (for example if the sending future is cancelled).

use std::fmt;

use exchange_core::{Block, PeerId};

type OnSent = Box<dyn FnOnce() + Send + 'static>;

pub struct BlockEnvelope {
    block: Block,
    peer: PeerId,
    on_sent: Option<OnSent>,
}

impl BlockEnvelope {
    pub fn new(block: Block, peer: PeerId, on_sent: impl FnOnce() + Send + 'static) -> Self {
        Self {
            block,
            peer,
            on_sent: Some(Box::new(on_sent)),
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Mark the transmission attempt finished.
    pub fn sent(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(on_sent) = self.on_sent.take() {
            on_sent();
        }
    }
}

impl Drop for BlockEnvelope {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for BlockEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockEnvelope")
            .field("block", &self.block.cid())
            .field("peer", &self.peer)
            .field("pending", &self.on_sent.is_some())
            .finish()
    }
}
