//! Want lists — which content ids we want, at what priority, and how many
//! independent requests are holding each one.
//!
//! `WantList` is the plain map used for per-peer mirrors. `SharedWantList`
//! is the process-wide list: one writer (the coordinator loop) and any
//! number of concurrent readers.
//!
//! Repeated wants for an active id keep the highest priority seen.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use exchange_core::ContentId;

/// One wanted id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WantEntry {
    pub cid: ContentId,
    pub priority: i32,
    /// Number of want operations merged into this entry.
    pub ref_count: usize,
}

impl WantEntry {
    pub fn new(cid: ContentId, priority: i32) -> Self {
        Self {
            cid,
            priority,
            ref_count: 1,
        }
    }
}

/// What merging a want did to a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// The id was not wanted before.
    Added,
    /// Already wanted; the priority went up.
    Raised,
    /// Already wanted at this priority or higher; only the ref count moved.
    Unchanged,
}

fn merge_into(existing: &mut WantEntry, incoming: &WantEntry) -> Merge {
    existing.ref_count += incoming.ref_count.max(1);
    if incoming.priority > existing.priority {
        existing.priority = incoming.priority;
        Merge::Raised
    } else {
        Merge::Unchanged
    }
}

fn sort_by_priority(entries: &mut [WantEntry]) {
    entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.cid.cmp(&b.cid)));
}

#[derive(Debug, Clone, Default)]
pub struct WantList {
    set: HashMap<ContentId, WantEntry>,
}

impl WantList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one want. Returns true if the id just became active.
    pub fn add(&mut self, cid: ContentId, priority: i32) -> bool {
        self.merge(WantEntry::new(cid, priority)) == Merge::Added
    }

    /// Merge an entry, keeping its ref count.
    pub fn merge(&mut self, entry: WantEntry) -> Merge {
        match self.set.get_mut(&entry.cid) {
            Some(existing) => merge_into(existing, &entry),
            None => {
                self.set.insert(
                    entry.cid,
                    WantEntry {
                        ref_count: entry.ref_count.max(1),
                        ..entry
                    },
                );
                Merge::Added
            }
        }
    }

    /// Drop one reference. Returns true if the id is no longer wanted.
    pub fn remove(&mut self, cid: &ContentId) -> bool {
        let Some(entry) = self.set.get_mut(cid) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            self.set.remove(cid);
            true
        } else {
            false
        }
    }

    pub fn get(&self, cid: &ContentId) -> Option<&WantEntry> {
        self.set.get(cid)
    }

    pub fn contains(&self, cid: &ContentId) -> bool {
        self.set.contains_key(cid)
    }

    /// Snapshot, most urgent first.
    pub fn entries(&self) -> Vec<WantEntry> {
        let mut entries: Vec<_> = self.set.values().copied().collect();
        sort_by_priority(&mut entries);
        entries
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// The process-wide want list, shared between the coordinator loop and
/// readers elsewhere (metrics, status, seeding new peers).
#[derive(Debug, Clone, Default)]
pub struct SharedWantList {
    set: Arc<DashMap<ContentId, WantEntry>>,
}

impl SharedWantList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one want. Returns true if the id just became active.
    pub fn add(&self, cid: ContentId, priority: i32) -> bool {
        self.merge(WantEntry::new(cid, priority)) == Merge::Added
    }

    pub fn merge(&self, entry: WantEntry) -> Merge {
        match self.set.entry(entry.cid) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                merge_into(occupied.get_mut(), &entry)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(WantEntry {
                    ref_count: entry.ref_count.max(1),
                    ..entry
                });
                Merge::Added
            }
        }
    }

    /// Drop one reference. Returns true if the id is no longer wanted.
    pub fn remove(&self, cid: &ContentId) -> bool {
        let emptied = match self.set.get_mut(cid) {
            Some(mut entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.ref_count == 0
            }
            None => return false,
        };
        if emptied {
            self.set.remove(cid);
        }
        emptied
    }

    pub fn get(&self, cid: &ContentId) -> Option<WantEntry> {
        self.set.get(cid).map(|e| *e.value())
    }

    pub fn contains(&self, cid: &ContentId) -> bool {
        self.set.contains_key(cid)
    }

    /// Snapshot, most urgent first.
    pub fn entries(&self) -> Vec<WantEntry> {
        let mut entries: Vec<_> = self.set.iter().map(|e| *e.value()).collect();
        sort_by_priority(&mut entries);
        entries
    }

    /// Plain copy, used to seed a new peer's mirror.
    pub fn to_want_list(&self) -> WantList {
        let mut list = WantList::new();
        for entry in self.set.iter() {
            list.merge(*entry.value());
        }
        list
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
