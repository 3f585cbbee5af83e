//! TTL-bounded persistence of captured events, keyed by web origin.
//!
//! Persistence is best-effort by contract: every failure on the save and
//! load paths is swallowed (and logged) so the hot capture path is never
//! blocked by a slow or failing storage write.

use crate::error::Result;
use crate::storage::KeyValueStorage;
use crate::types::{CapturedEvent, PersistedSnapshot, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Storage key prefix for per-origin snapshots.
pub const PERSISTED_EVENTS_KEY_PREFIX: &str = "persisted_events_";

/// Persistence thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Events older than this are discarded on load. Zero disables the TTL.
    pub max_age_ms: i64,
    /// Snapshot cap; save truncates to the most recent this many events.
    pub max_events: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_ms: 30 * 60 * 1000,
            max_events: 100,
        }
    }
}

/// Per-origin snapshot store. The snapshot is shared by every tab showing
/// the same origin, not scoped per tab.
pub struct PersistenceStore {
    origin: String,
    storage: Arc<dyn KeyValueStorage>,
    config: RwLock<PersistenceConfig>,
}

impl PersistenceStore {
    pub fn new(
        origin: impl Into<String>,
        storage: Arc<dyn KeyValueStorage>,
        config: PersistenceConfig,
    ) -> Self {
        Self {
            origin: origin.into(),
            storage,
            config: RwLock::new(config),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn config(&self) -> PersistenceConfig {
        *self.config.read()
    }

    /// Write a snapshot of the given events (newest first).
    ///
    /// The persisted annotation is stripped from every event before writing
    /// so markers never accumulate across save/load cycles. Failures are
    /// swallowed; persistence never blocks or fails the caller.
    pub fn save_events(&self, events: &[CapturedEvent]) {
        let config = *self.config.read();
        if !config.enabled {
            return;
        }

        let snapshot = PersistedSnapshot {
            events: events
                .iter()
                .take(config.max_events)
                .cloned()
                .map(|mut event| {
                    event.source.persisted = false;
                    event
                })
                .collect(),
            last_updated: Timestamp::now(),
        };

        if let Err(e) = self.write_snapshot(&snapshot) {
            warn!(origin = %self.origin, error = %e, "failed to persist events");
        }
    }

    /// Load the origin's snapshot, discarding events older than the TTL.
    ///
    /// Every returned event carries the persisted annotation, set exactly
    /// once here regardless of how many save/load cycles it survived.
    /// Missing or unreadable snapshots yield an empty sequence.
    pub fn load_events(&self) -> Vec<CapturedEvent> {
        let snapshot = match self.read_snapshot() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(origin = %self.origin, error = %e, "failed to load persisted events");
                return Vec::new();
            }
        };

        let config = *self.config.read();
        let cutoff = Timestamp::now().0 - config.max_age_ms;

        snapshot
            .events
            .into_iter()
            .filter(|event| config.max_age_ms <= 0 || event.timestamp.0 >= cutoff)
            .map(|mut event| {
                event.source.persisted = true;
                event
            })
            .collect()
    }

    /// Delete the origin's snapshot. Failures are swallowed.
    pub fn clear_events(&self) {
        if let Err(e) = self.storage.remove(&self.key()) {
            warn!(origin = %self.origin, error = %e, "failed to clear persisted events");
        }
    }

    /// Change thresholds for future operations. Nothing already stored is
    /// re-filtered.
    pub fn update_settings(&self, config: PersistenceConfig) {
        *self.config.write() = config;
    }

    fn key(&self) -> String {
        format!("{}{}", PERSISTED_EVENTS_KEY_PREFIX, self.origin)
    }

    fn write_snapshot(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        let bytes = rmp_serde::to_vec(snapshot)?;
        self.storage.set(&self.key(), &bytes)
    }

    fn read_snapshot(&self) -> Result<Option<PersistedSnapshot>> {
        match self.storage.get(&self.key())? {
            Some(bytes) => Ok(Some(rmp_serde::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::storage::MemoryStorage;
    use crate::types::{EventId, EventSource};

    fn make_event(name: &str, ts: i64) -> CapturedEvent {
        CapturedEvent {
            id: EventId(format!("{}-{}", ts, name)),
            timestamp: Timestamp(ts),
            name: name.to_string(),
            payload: serde_json::json!({"event": name}),
            source: EventSource::live("dataLayer"),
            raw_push: serde_json::json!({}),
            sequence_index: 0,
            group_id: None,
        }
    }

    fn store_with(config: PersistenceConfig) -> PersistenceStore {
        PersistenceStore::new("example.com", Arc::new(MemoryStorage::new()), config)
    }

    #[test]
    fn test_round_trip_annotates_once() {
        let store = store_with(PersistenceConfig {
            enabled: true,
            max_age_ms: 0,
            max_events: 100,
        });
        let now = Timestamp::now().0;
        store.save_events(&[make_event("a", now), make_event("b", now)]);

        let loaded = store.load_events();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|e| e.source.persisted));

        // A second cycle must not accumulate markers: events saved while
        // annotated come back annotated exactly once, with the stored form
        // stripped.
        store.save_events(&loaded);
        let reloaded = store.load_events();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.iter().all(|e| e.source.persisted));
        assert_eq!(reloaded[0].source.buffer, "dataLayer");
    }

    #[test]
    fn test_save_caps_at_max_events() {
        let store = store_with(PersistenceConfig {
            enabled: true,
            max_age_ms: 0,
            max_events: 2,
        });
        let now = Timestamp::now().0;
        // Newest first, as the buffer hands them over.
        store.save_events(&[
            make_event("c", now + 2),
            make_event("b", now + 1),
            make_event("a", now),
        ]);

        let loaded = store.load_events();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "c");
        assert_eq!(loaded[1].name, "b");
    }

    #[test]
    fn test_ttl_discards_stale_events() {
        let store = store_with(PersistenceConfig {
            enabled: true,
            max_age_ms: 60_000,
            max_events: 100,
        });
        let now = Timestamp::now().0;
        store.save_events(&[make_event("fresh", now), make_event("stale", now - 120_000)]);

        let loaded = store.load_events();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "fresh");
    }

    #[test]
    fn test_zero_max_age_keeps_everything() {
        let store = store_with(PersistenceConfig {
            enabled: true,
            max_age_ms: 0,
            max_events: 100,
        });
        store.save_events(&[make_event("ancient", 1)]);
        assert_eq!(store.load_events().len(), 1);
    }

    #[test]
    fn test_disabled_store_saves_nothing() {
        let store = store_with(PersistenceConfig {
            enabled: false,
            max_age_ms: 0,
            max_events: 100,
        });
        store.save_events(&[make_event("a", Timestamp::now().0)]);
        assert!(store.load_events().is_empty());
    }

    #[test]
    fn test_clear_removes_snapshot() {
        let store = store_with(PersistenceConfig {
            enabled: true,
            max_age_ms: 0,
            max_events: 100,
        });
        store.save_events(&[make_event("a", Timestamp::now().0)]);
        store.clear_events();
        assert!(store.load_events().is_empty());
    }

    /// Storage that fails every operation.
    struct FailingStorage;

    impl KeyValueStorage for FailingStorage {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(CoreError::InvalidFormat("broken".into()))
        }
        fn set(&self, _key: &str, _value: &[u8]) -> Result<()> {
            Err(CoreError::InvalidFormat("broken".into()))
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Err(CoreError::InvalidFormat("broken".into()))
        }
    }

    #[test]
    fn test_storage_failures_are_swallowed() {
        let store = PersistenceStore::new(
            "example.com",
            Arc::new(FailingStorage),
            PersistenceConfig::default(),
        );
        store.save_events(&[make_event("a", Timestamp::now().0)]);
        assert!(store.load_events().is_empty());
        store.clear_events();
    }

    #[test]
    fn test_update_settings_is_prospective() {
        let store = store_with(PersistenceConfig {
            enabled: true,
            max_age_ms: 0,
            max_events: 100,
        });
        let now = Timestamp::now().0;
        store.save_events(&[make_event("a", now), make_event("b", now)]);

        // Tightening the cap does not rewrite the stored snapshot.
        store.update_settings(PersistenceConfig {
            enabled: true,
            max_age_ms: 0,
            max_events: 1,
        });
        assert_eq!(store.load_events().len(), 2);
    }
}
