//! Per-content-script orchestrator.
//!
//! Composes the local event buffer, the grouping engine, and the
//! persistence store behind a single `add_event` entry point, and relays
//! every capture to the background coordinator over the message router.

use crate::grouping::GroupingEngine;
use crate::persist::PersistenceStore;
use crate::router::MessageRouter;
use crate::settings::{InspectorSettings, SettingsPatch};
use crate::storage::KeyValueStorage;
use crate::store::EventStore;
use crate::types::{CapturedEvent, EventGroup, EventId, GroupId, TabId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Local buffer capacity; deliberately lower than the tab-level store in
/// the background coordinator.
pub const DEFAULT_LOCAL_MAX_EVENTS: usize = 500;

/// Key for the single local buffer inside the per-tab store.
const LOCAL_BUFFER_TAB: TabId = TabId(0);

/// Lifecycle of a manager instance. There is no terminal state besides
/// external teardown of the whole context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerPhase {
    Uninitialized,
    Loading,
    Active,
}

/// Callback invoked with the post-mutation event snapshot, newest first.
pub type EventsListener = Box<dyn Fn(&[CapturedEvent]) + Send + Sync>;

/// Callback invoked with the post-mutation group list, newest first.
pub type GroupsListener = Box<dyn Fn(&[EventGroup]) + Send + Sync>;

/// Orchestrates capture, grouping, persistence, and relay for one content
/// script.
pub struct EventManager {
    origin: String,
    router: MessageRouter,
    persistence: PersistenceStore,
    grouping: Mutex<GroupingEngine>,
    buffer: EventStore,
    settings: RwLock<InspectorSettings>,
    expanded: RwLock<HashSet<EventId>>,
    phase: RwLock<ManagerPhase>,
    on_events_change: RwLock<Option<EventsListener>>,
    on_groups_change: RwLock<Option<GroupsListener>>,
}

impl EventManager {
    pub fn new(
        origin: impl Into<String>,
        router: MessageRouter,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        let origin = origin.into();
        let settings = InspectorSettings::default();
        Self {
            persistence: PersistenceStore::new(
                origin.clone(),
                storage,
                settings.persistence,
            ),
            grouping: Mutex::new(GroupingEngine::new(settings.grouping.clone())),
            buffer: EventStore::new(DEFAULT_LOCAL_MAX_EVENTS),
            settings: RwLock::new(settings),
            expanded: RwLock::new(HashSet::new()),
            phase: RwLock::new(ManagerPhase::Uninitialized),
            on_events_change: RwLock::new(None),
            on_groups_change: RwLock::new(None),
            origin,
            router,
        }
    }

    pub fn phase(&self) -> ManagerPhase {
        *self.phase.read()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn set_on_events_change(&self, listener: EventsListener) {
        *self.on_events_change.write() = Some(listener);
    }

    pub fn set_on_groups_change(&self, listener: GroupsListener) {
        *self.on_groups_change.write() = Some(listener);
    }

    /// Move from Uninitialized through Loading to Active: fetch merged
    /// settings from the coordinator (local defaults when unreachable),
    /// restore the persisted snapshot when persistence is on, and rebuild
    /// groups. Idempotent; later calls are no-ops.
    pub fn initialize(&self) {
        {
            let mut phase = self.phase.write();
            if *phase != ManagerPhase::Uninitialized {
                return;
            }
            *phase = ManagerPhase::Loading;
        }

        let settings = self
            .router
            .get_settings(Some(&self.origin))
            .unwrap_or_else(|| {
                debug!(origin = %self.origin, "coordinator unreachable, using default settings");
                InspectorSettings::default()
            });
        self.apply_settings(settings);

        if self.settings.read().persistence.enabled {
            // Restored newest-first; insert oldest-first so the head stays
            // the newest event.
            for event in self.persistence.load_events().into_iter().rev() {
                self.buffer.add_event(LOCAL_BUFFER_TAB, event);
            }
        }

        self.rebuild_groups();
        *self.phase.write() = ManagerPhase::Active;
        self.notify_events();
        self.notify_groups();
    }

    /// Ingest one capture: group it, buffer it, persist best-effort, relay
    /// to the coordinator, and notify listeners once.
    pub fn add_event(&self, mut event: CapturedEvent) {
        if self.phase() != ManagerPhase::Active {
            debug!(name = %event.name, "event dropped before initialization");
            return;
        }
        if !self.settings.read().enabled {
            return;
        }

        self.grouping.lock().add_event(&mut event);
        self.buffer.add_event(LOCAL_BUFFER_TAB, event.clone());

        if self.settings.read().persistence.enabled {
            self.persistence.save_events(&self.events());
        }

        // Tab identity is resolved by the transport's sender info.
        self.router.send_event(None, event);

        self.notify_events();
        self.notify_groups();
    }

    /// Clear the local buffer, derived groups, the persisted snapshot, and
    /// this tab's buffer in the coordinator.
    pub fn clear_events(&self) {
        self.buffer.clear_events(LOCAL_BUFFER_TAB);
        self.grouping.lock().clear();
        self.expanded.write().clear();
        self.persistence.clear_events();
        self.router.clear_events(None);
        self.notify_events();
        self.notify_groups();
    }

    /// Snapshot of buffered events, newest first.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.buffer.get_events(LOCAL_BUFFER_TAB)
    }

    pub fn event_count(&self) -> usize {
        self.buffer.get_event_count(LOCAL_BUFFER_TAB)
    }

    /// Snapshot of derived groups, newest first.
    pub fn groups(&self) -> Vec<EventGroup> {
        self.grouping.lock().groups()
    }

    pub fn settings(&self) -> InspectorSettings {
        self.settings.read().clone()
    }

    /// Pure view-state passthrough. Returns the new expanded state.
    pub fn toggle_event_expanded(&self, id: &EventId) -> bool {
        let mut expanded = self.expanded.write();
        if expanded.remove(id) {
            false
        } else {
            expanded.insert(id.clone());
            true
        }
    }

    pub fn is_event_expanded(&self, id: &EventId) -> bool {
        self.expanded.read().contains(id)
    }

    /// Flip a group's collapsed view state and notify group listeners.
    pub fn toggle_group_collapsed(&self, id: &GroupId) {
        self.grouping.lock().toggle_collapsed(id);
        self.notify_groups();
    }

    /// Apply a settings patch locally and forward it to the coordinator,
    /// scoped to this origin unless `save_global` is set.
    pub fn update_settings(&self, patch: SettingsPatch, save_global: bool) {
        let updated = {
            let mut settings = self.settings.write();
            patch.apply(&mut settings);
            settings.clone()
        };
        self.apply_settings(updated);
        self.rebuild_groups();

        let domain = (!save_global).then_some(self.origin.as_str());
        self.router.update_settings(patch, domain, save_global);

        self.notify_groups();
    }

    /// Push engine configuration out of a settings snapshot.
    fn apply_settings(&self, settings: InspectorSettings) {
        self.grouping.lock().set_config(settings.grouping.clone());
        self.persistence.update_settings(settings.persistence);
        *self.settings.write() = settings;
    }

    /// Recompute groups from the buffer, oldest first.
    fn rebuild_groups(&self) {
        let mut chronological = self.events();
        chronological.reverse();
        self.grouping.lock().rebuild_groups(&chronological);
    }

    fn notify_events(&self) {
        let snapshot = self.events();
        if let Some(listener) = self.on_events_change.read().as_ref() {
            listener(&snapshot);
        }
    }

    fn notify_groups(&self) {
        let snapshot = self.groups();
        if let Some(listener) = self.on_groups_change.read().as_ref() {
            listener(&snapshot);
        }
    }
}
