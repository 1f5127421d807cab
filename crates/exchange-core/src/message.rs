//! Want messages — the unit a peer pipeline hands to the network.
//!
//! A message is either *full* (the complete want list, replacing whatever
//! the receiver knew about us) or *incremental* (adds and cancels on top of
//! what was sent before). It may also carry blocks. Framing and encoding
//! are owned by the transport; the type is serde-serializable so any codec
//! can carry it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::id::ContentId;

/// One want-list operation inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub cid: ContentId,
    pub priority: i32,
    pub cancel: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantMessage {
    full: bool,
    // Keyed by id: a later add or cancel for the same id replaces the earlier one.
    wants: BTreeMap<ContentId, MessageEntry>,
    blocks: Vec<Block>,
}

impl WantMessage {
    /// A message carrying the complete want list.
    pub fn full() -> Self {
        Self {
            full: true,
            ..Self::default()
        }
    }

    /// A message carrying changes since the last one.
    pub fn incremental() -> Self {
        Self::default()
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn add_entry(&mut self, cid: ContentId, priority: i32) {
        self.wants.insert(
            cid,
            MessageEntry {
                cid,
                priority,
                cancel: false,
            },
        );
    }

    pub fn cancel(&mut self, cid: ContentId) {
        self.wants.insert(
            cid,
            MessageEntry {
                cid,
                priority: 0,
                cancel: true,
            },
        );
    }

    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// True when there is nothing to transmit.
    pub fn is_empty(&self) -> bool {
        self.wants.is_empty() && self.blocks.is_empty()
    }

    pub fn entries(&self) -> Vec<MessageEntry> {
        self.wants.values().copied().collect()
    }

    pub fn entry(&self, cid: &ContentId) -> Option<&MessageEntry> {
        self.wants.get(cid)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}
