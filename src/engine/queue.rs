//! Work queue: insertion-ordered items awaiting or undergoing execution.

use std::collections::VecDeque;
use std::time::Instant;

use crate::model::{WorkId, WorkItem};

/// FIFO of work items.
///
/// Draining walks front to back; timeout scans walk back to front, so the
/// newest expired item is evicted first. An item stays here from enqueue
/// until its single removal, whether or not its callback is running.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: VecDeque<WorkItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Returns its id.
    pub fn push(&mut self, item: WorkItem) -> WorkId {
        let id = item.id();
        self.items.push_back(item);
        id
    }

    /// Take an item out of the queue. `None` if it was already removed.
    pub fn remove(&mut self, id: WorkId) -> Option<WorkItem> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        self.items.remove(index)
    }

    pub fn get(&self, id: WorkId) -> Option<&WorkItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: WorkId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &WorkItem> {
        self.items.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut WorkItem> {
        self.items.iter_mut()
    }

    /// Ids of items whose deadline has passed, newest first.
    pub fn expired(&self, now: Instant) -> Vec<WorkId> {
        self.items
            .iter()
            .rev()
            .filter(|item| item.is_expired(now))
            .map(WorkItem::id)
            .collect()
    }
}
