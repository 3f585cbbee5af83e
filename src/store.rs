//! Per-tab bounded event buffers.
//!
//! One buffer per browser tab, newest first, truncated in the same step as
//! every insertion so the configured bound is never observably exceeded.

use crate::types::{CapturedEvent, TabId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Default capacity of the tab-level store in the background coordinator.
pub const DEFAULT_MAX_EVENTS_PER_TAB: usize = 1000;

/// Callback invoked once after every successful insertion, with the
/// post-insert snapshot of the tab's buffer.
pub type EventsChangeListener = Box<dyn Fn(TabId, &[CapturedEvent]) + Send + Sync>;

/// Bounded, newest-first buffer of captured events, keyed by tab.
pub struct EventStore {
    tabs: RwLock<HashMap<TabId, Vec<CapturedEvent>>>,
    max_events_per_tab: RwLock<usize>,
    on_change: RwLock<Option<EventsChangeListener>>,
}

impl EventStore {
    /// Create a store with the given per-tab capacity.
    pub fn new(max_events_per_tab: usize) -> Self {
        Self {
            tabs: RwLock::new(HashMap::new()),
            max_events_per_tab: RwLock::new(max_events_per_tab.max(1)),
            on_change: RwLock::new(None),
        }
    }

    /// Register the change listener. At most one; replaces any previous.
    pub fn set_on_change(&self, listener: EventsChangeListener) {
        *self.on_change.write() = Some(listener);
    }

    /// Insert an event at the head of the tab's buffer, truncating the tail
    /// in the same step when the capacity is exceeded.
    pub fn add_event(&self, tab_id: TabId, event: CapturedEvent) {
        let snapshot = {
            let max = *self.max_events_per_tab.read();
            let mut tabs = self.tabs.write();
            let buffer = tabs.entry(tab_id).or_default();
            buffer.insert(0, event);
            buffer.truncate(max);
            buffer.clone()
        };

        // Listener runs outside the lock so it may call back into the store.
        if let Some(listener) = self.on_change.read().as_ref() {
            listener(tab_id, &snapshot);
        }
    }

    /// Snapshot of the tab's events, newest first. Unknown tabs yield an
    /// empty sequence, never an error.
    pub fn get_events(&self, tab_id: TabId) -> Vec<CapturedEvent> {
        self.tabs.read().get(&tab_id).cloned().unwrap_or_default()
    }

    /// Number of events buffered for the tab.
    pub fn get_event_count(&self, tab_id: TabId) -> usize {
        self.tabs.read().get(&tab_id).map_or(0, Vec::len)
    }

    /// Empty the tab's buffer without removing the tab entry.
    pub fn clear_events(&self, tab_id: TabId) {
        if let Some(buffer) = self.tabs.write().get_mut(&tab_id) {
            buffer.clear();
        }
    }

    /// Empty every buffer, keeping the tab entries.
    pub fn clear_all(&self) {
        for buffer in self.tabs.write().values_mut() {
            buffer.clear();
        }
    }

    /// Delete the tab's buffer entirely. Used on tab-closed notification to
    /// bound memory growth.
    pub fn remove_tab(&self, tab_id: TabId) {
        self.tabs.write().remove(&tab_id);
    }

    /// Tabs currently holding a buffer.
    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.read().keys().copied().collect()
    }

    /// Change the per-tab capacity. Existing buffers are truncated to the
    /// new bound immediately.
    pub fn set_max_events_per_tab(&self, max: usize) {
        let max = max.max(1);
        *self.max_events_per_tab.write() = max;
        for buffer in self.tabs.write().values_mut() {
            buffer.truncate(max);
        }
    }

    pub fn max_events_per_tab(&self) -> usize {
        *self.max_events_per_tab.read()
    }
}
