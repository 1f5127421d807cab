//! Content blocks — immutable payloads addressed by their BLAKE3 hash.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::id::ContentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    cid: ContentId,
    data: Bytes,
}

impl Block {
    /// Wrap a payload, computing its content id.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            cid: ContentId::of(&data),
            data,
        }
    }

    pub fn cid(&self) -> ContentId {
        self.cid
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
