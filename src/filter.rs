//! Event filtering: include/exclude name patterns plus free-text search.

use crate::types::CapturedEvent;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// How the pattern set is applied to event names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// An event passes only if some pattern matches its name.
    Include,
    /// An event is rejected if some pattern matches its name.
    Exclude,
}

/// Filter state.
///
/// Patterns keep insertion order for display but behave as a set: adding a
/// duplicate or removing an absent pattern is a no-op. Mode and patterns are
/// coupled; switching mode invalidates the existing patterns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub patterns: Vec<String>,
    pub mode: FilterMode,
    pub search_text: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            mode: FilterMode::Exclude,
            search_text: String::new(),
        }
    }
}

/// Partial update for [`FilterConfig`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterPatch {
    pub patterns: Option<Vec<String>>,
    pub mode: Option<FilterMode>,
    pub search_text: Option<String>,
}

/// Callback invoked once per state-changing mutation.
pub type FilterChangeListener = Box<dyn Fn(&FilterConfig) + Send + Sync>;

/// Stateful include/exclude pattern matcher plus free-text search.
pub struct FilterEngine {
    config: RwLock<FilterConfig>,
    on_change: RwLock<Option<FilterChangeListener>>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::with_config(FilterConfig::default())
    }

    pub fn with_config(config: FilterConfig) -> Self {
        Self {
            config: RwLock::new(config),
            on_change: RwLock::new(None),
        }
    }

    /// Register the change listener. At most one; replaces any previous.
    pub fn set_on_change(&self, listener: FilterChangeListener) {
        *self.on_change.write() = Some(listener);
    }

    /// Whether an event survives both filter stages.
    ///
    /// Stage 1 applies the pattern set to the event name; stage 2 requires
    /// the search text to appear in the name or the serialized structured
    /// payload. The raw push is not scanned.
    pub fn event_passes_filter(&self, event: &CapturedEvent) -> bool {
        let config = self.config.read();

        if !config.patterns.is_empty() {
            let name = event.name.to_lowercase();
            let matched = config
                .patterns
                .iter()
                .any(|p| name.contains(&p.to_lowercase()));
            let passes_patterns = match config.mode {
                FilterMode::Include => matched,
                FilterMode::Exclude => !matched,
            };
            if !passes_patterns {
                return false;
            }
        }

        if !config.search_text.is_empty() {
            let needle = config.search_text.to_lowercase();
            if event.name.to_lowercase().contains(&needle) {
                return true;
            }
            let payload = serde_json::to_string(&event.payload).unwrap_or_default();
            return payload.to_lowercase().contains(&needle);
        }

        true
    }

    /// Add a pattern. Duplicates are a no-op and fire no notification.
    pub fn add_filter(&self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        let changed = {
            let mut config = self.config.write();
            if config.patterns.contains(&pattern) {
                false
            } else {
                config.patterns.push(pattern);
                true
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Remove a pattern. Absent patterns are a no-op and fire no
    /// notification.
    pub fn remove_filter(&self, pattern: &str) {
        let changed = {
            let mut config = self.config.write();
            let before = config.patterns.len();
            config.patterns.retain(|p| p != pattern);
            config.patterns.len() != before
        };
        if changed {
            self.notify();
        }
    }

    /// Switch filter mode. A no-op when the mode is unchanged; otherwise
    /// sets the mode and clears all patterns in one step.
    pub fn set_filter_mode(&self, mode: FilterMode) {
        let changed = {
            let mut config = self.config.write();
            if config.mode == mode {
                false
            } else {
                config.mode = mode;
                config.patterns.clear();
                true
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Update the free-text search. A no-op when the text is unchanged.
    pub fn set_search_text(&self, text: impl Into<String>) {
        let text = text.into();
        let changed = {
            let mut config = self.config.write();
            if config.search_text == text {
                false
            } else {
                config.search_text = text;
                true
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Reset patterns and search text together, firing once.
    pub fn clear_filters(&self) {
        {
            let mut config = self.config.write();
            config.patterns.clear();
            config.search_text.clear();
        }
        self.notify();
    }

    /// Snapshot of the current configuration. Mutating the returned value
    /// never affects internal state.
    pub fn config(&self) -> FilterConfig {
        self.config.read().clone()
    }

    /// Apply a partial update, firing at most one notification.
    pub fn update_config(&self, patch: FilterPatch) {
        let changed = {
            let mut config = self.config.write();
            let before = config.clone();
            if let Some(patterns) = patch.patterns {
                config.patterns = patterns;
            }
            if let Some(mode) = patch.mode {
                config.mode = mode;
            }
            if let Some(search_text) = patch.search_text {
                config.search_text = search_text;
            }
            *config != before
        };
        if changed {
            self.notify();
        }
    }

    /// Filter-state-independent count of events whose name matches a
    /// pattern. Used to preview a pattern's impact before committing it.
    pub fn count_matching_events(events: &[CapturedEvent], pattern: &str) -> usize {
        let pattern = pattern.to_lowercase();
        events
            .iter()
            .filter(|e| e.name.to_lowercase().contains(&pattern))
            .count()
    }

    fn notify(&self) {
        let snapshot = self.config.read().clone();
        if let Some(listener) = self.on_change.read().as_ref() {
            listener(&snapshot);
        }
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new()
    }
}
