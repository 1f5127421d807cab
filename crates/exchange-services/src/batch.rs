//! Want batches — ordered want/cancel operations submitted to the coordinator.

use exchange_core::{ContentId, PeerId};

use crate::wantlist::WantEntry;

/// A single want or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WantOp {
    pub entry: WantEntry,
    pub cancel: bool,
}

impl WantOp {
    pub fn want(cid: ContentId, priority: i32) -> Self {
        Self {
            entry: WantEntry::new(cid, priority),
            cancel: false,
        }
    }

    pub fn cancel(cid: ContentId) -> Self {
        Self {
            entry: WantEntry::new(cid, 0),
            cancel: true,
        }
    }

    pub fn cid(&self) -> ContentId {
        self.entry.cid
    }
}

#[derive(Debug, Clone, Default)]
pub struct WantBatch {
    pub ops: Vec<WantOp>,
    /// Peers to tell. Empty means every registered peer.
    pub targets: Vec<PeerId>,
}

impl WantBatch {
    /// Wants for `ids`, the first at `max_priority` and each next one lower.
    /// Priorities stop at `i32::MIN`, so ids past that point tie.
    pub fn wants(ids: &[ContentId], max_priority: i32) -> Self {
        let ops = ids
            .iter()
            .enumerate()
            .map(|(i, cid)| {
                let offset = i32::try_from(i).unwrap_or(i32::MAX);
                WantOp::want(*cid, max_priority.saturating_sub(offset))
            })
            .collect();
        Self {
            ops,
            targets: Vec::new(),
        }
    }

    pub fn cancels(ids: &[ContentId]) -> Self {
        Self {
            ops: ids.iter().copied().map(WantOp::cancel).collect(),
            targets: Vec::new(),
        }
    }

    pub fn with_targets(mut self, targets: Vec<PeerId>) -> Self {
        self.targets = targets;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.targets.is_empty()
    }
}
