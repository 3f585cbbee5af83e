//! Inspector settings: global defaults plus per-origin overrides.
//!
//! The background coordinator owns the canonical copy, persisted through
//! the storage abstraction so it survives coordinator suspension. Every
//! other context fetches a merged view over the message router.

use crate::error::{CoreError, Result};
use crate::filter::FilterConfig;
use crate::grouping::GroupingConfig;
use crate::persist::PersistenceConfig;
use crate::storage::KeyValueStorage;
use crate::store::DEFAULT_MAX_EVENTS_PER_TAB;
use crate::types::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Storage key for the global settings object.
pub const SETTINGS_KEY: &str = "inspector_settings";

/// Storage key for the per-origin override table.
pub const DOMAIN_SETTINGS_KEY: &str = "domain_settings";

/// Format version stamped into settings export bundles.
pub const SETTINGS_EXPORT_VERSION: u32 = 1;

/// Global inspector settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectorSettings {
    /// Master capture switch.
    pub enabled: bool,
    /// Capacity of the background per-tab store.
    pub max_events_per_tab: usize,
    pub filters: FilterConfig,
    pub grouping: GroupingConfig,
    pub persistence: PersistenceConfig,
}

impl Default for InspectorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_events_per_tab: DEFAULT_MAX_EVENTS_PER_TAB,
            filters: FilterConfig::default(),
            grouping: GroupingConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Partial settings update. Present fields replace the corresponding
/// section wholesale; absent fields leave it untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub enabled: Option<bool>,
    pub max_events_per_tab: Option<usize>,
    pub filters: Option<FilterConfig>,
    pub grouping: Option<GroupingConfig>,
    pub persistence: Option<PersistenceConfig>,
}

impl SettingsPatch {
    /// Apply this patch to a settings object.
    pub fn apply(&self, settings: &mut InspectorSettings) {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(max) = self.max_events_per_tab {
            settings.max_events_per_tab = max;
        }
        if let Some(ref filters) = self.filters {
            settings.filters = filters.clone();
        }
        if let Some(ref grouping) = self.grouping {
            settings.grouping = grouping.clone();
        }
        if let Some(persistence) = self.persistence {
            settings.persistence = persistence;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &SettingsPatch::default()
    }
}

/// A per-origin settings override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginOverride {
    pub origin: String,
    pub patch: SettingsPatch,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Portable bundle of every settings table, for export/import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingsExport {
    pub version: u32,
    pub global: InspectorSettings,
    pub overrides: Vec<OriginOverride>,
}

/// Durable settings store: global settings plus the origin-override table.
pub struct SettingsStore {
    storage: Arc<dyn KeyValueStorage>,
    global: RwLock<InspectorSettings>,
    overrides: RwLock<HashMap<String, OriginOverride>>,
}

impl SettingsStore {
    /// Load both tables from storage, falling back to defaults when a table
    /// is missing or unreadable.
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let global = match read_value::<InspectorSettings>(storage.as_ref(), SETTINGS_KEY) {
            Ok(Some(settings)) => settings,
            Ok(None) => InspectorSettings::default(),
            Err(e) => {
                warn!(error = %e, "failed to load global settings, using defaults");
                InspectorSettings::default()
            }
        };

        let overrides =
            match read_value::<HashMap<String, OriginOverride>>(storage.as_ref(), DOMAIN_SETTINGS_KEY)
            {
                Ok(Some(overrides)) => overrides,
                Ok(None) => HashMap::new(),
                Err(e) => {
                    warn!(error = %e, "failed to load origin overrides, starting empty");
                    HashMap::new()
                }
            };

        Self {
            storage,
            global: RwLock::new(global),
            overrides: RwLock::new(overrides),
        }
    }

    /// Snapshot of the global settings.
    pub fn global(&self) -> InspectorSettings {
        self.global.read().clone()
    }

    /// Apply a patch to the global settings and persist the result.
    pub fn update_global(&self, patch: &SettingsPatch) -> Result<InspectorSettings> {
        let updated = {
            let mut global = self.global.write();
            patch.apply(&mut global);
            global.clone()
        };
        self.save_global(&updated)?;
        Ok(updated)
    }

    /// Global settings with the origin's override patch applied on top.
    pub fn merged_for_origin(&self, origin: &str) -> InspectorSettings {
        let mut settings = self.global();
        if let Some(entry) = self.overrides.read().get(origin) {
            entry.patch.apply(&mut settings);
        }
        settings
    }

    /// The raw override entry for an origin, if any.
    pub fn override_for(&self, origin: &str) -> Option<OriginOverride> {
        self.overrides.read().get(origin).cloned()
    }

    /// All override entries, sorted by origin for stable display.
    pub fn all_overrides(&self) -> Vec<OriginOverride> {
        let mut entries: Vec<OriginOverride> = self.overrides.read().values().cloned().collect();
        entries.sort_by(|a, b| a.origin.cmp(&b.origin));
        entries
    }

    /// Create or update an origin's override patch and persist the table.
    pub fn set_override(&self, origin: &str, patch: SettingsPatch) -> Result<OriginOverride> {
        let now = Timestamp::now();
        let entry = {
            let mut overrides = self.overrides.write();
            let entry = overrides
                .entry(origin.to_string())
                .and_modify(|existing| {
                    existing.patch = patch.clone();
                    existing.updated_at = now;
                })
                .or_insert_with(|| OriginOverride {
                    origin: origin.to_string(),
                    patch,
                    created_at: now,
                    updated_at: now,
                });
            entry.clone()
        };
        self.save_overrides()?;
        Ok(entry)
    }

    /// Delete an origin's override. Returns whether one existed.
    pub fn delete_override(&self, origin: &str) -> Result<bool> {
        let existed = self.overrides.write().remove(origin).is_some();
        if existed {
            self.save_overrides()?;
        }
        Ok(existed)
    }

    /// Bundle both tables for export.
    pub fn export_all(&self) -> SettingsExport {
        SettingsExport {
            version: SETTINGS_EXPORT_VERSION,
            global: self.global(),
            overrides: self.all_overrides(),
        }
    }

    /// Replace both tables from a bundle. Unknown format versions are
    /// rejected and leave the current state untouched.
    pub fn import_all(&self, bundle: SettingsExport) -> Result<()> {
        if bundle.version != SETTINGS_EXPORT_VERSION {
            return Err(CoreError::UnsupportedExportVersion(bundle.version));
        }

        {
            let mut global = self.global.write();
            *global = bundle.global;
        }
        {
            let mut overrides = self.overrides.write();
            *overrides = bundle
                .overrides
                .into_iter()
                .map(|entry| (entry.origin.clone(), entry))
                .collect();
        }

        self.save_global(&self.global())?;
        self.save_overrides()?;
        Ok(())
    }

    fn save_global(&self, settings: &InspectorSettings) -> Result<()> {
        let bytes = rmp_serde::to_vec(settings)?;
        self.storage.set(SETTINGS_KEY, &bytes)
    }

    fn save_overrides(&self) -> Result<()> {
        let snapshot = self.overrides.read().clone();
        let bytes = rmp_serde::to_vec(&snapshot)?;
        self.storage.set(DOMAIN_SETTINGS_KEY, &bytes)
    }
}

fn read_value<T: serde::de::DeserializeOwned>(
    storage: &dyn KeyValueStorage,
    key: &str,
) -> Result<Option<T>> {
    match storage.get(key)? {
        Some(bytes) => Ok(Some(rmp_serde::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
