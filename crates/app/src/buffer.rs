//! Deduplicating event buffer.

use codebase_index_domain::WorkspaceEventData;
use indexmap::IndexMap;

/// Pending events keyed by [`WorkspaceEventData::key`].
///
/// A newer event for the same key replaces the older one and moves to the
/// back, so a drain yields the most recent state per key in arrival order.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: IndexMap<String, WorkspaceEventData>,
}

impl EventBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the buffer length afterwards.
    pub fn insert(&mut self, event: WorkspaceEventData) -> usize {
        let key = event.key();
        self.events.shift_remove(&key);
        self.events.insert(key, event);
        self.events.len()
    }

    /// Buffered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take every event, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<WorkspaceEventData> {
        std::mem::take(&mut self.events).into_values().collect()
    }
}
