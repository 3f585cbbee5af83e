//! Segmentation of the event sequence into time- or trigger-bounded groups.

use crate::types::{CapturedEvent, EventGroup, GroupId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What opens a new group boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// A gap longer than the configured window starts a new group.
    TimeWindow,
    /// An event whose name contains a configured trigger substring starts a
    /// new group.
    TriggerEvent,
}

/// Grouping configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupingConfig {
    pub enabled: bool,
    pub mode: GroupingMode,
    pub time_window_ms: i64,
    /// Trigger-name substrings, matched case-insensitively, in order.
    pub trigger_event_names: Vec<String>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: GroupingMode::TimeWindow,
            time_window_ms: 10_000,
            trigger_event_names: Vec::new(),
        }
    }
}

/// Segments a chronological event sequence into [`EventGroup`]s.
///
/// Two entry points apply the identical start/continue rule: `rebuild_groups`
/// recomputes everything from scratch and `add_event` is the incremental
/// fast path for a single new capture.
pub struct GroupingEngine {
    config: GroupingConfig,
    /// Current groups, newest first; members newest first.
    groups: Vec<EventGroup>,
    /// Collapsed view state, carried across rebuilds by group id.
    collapsed: HashMap<GroupId, bool>,
}

impl GroupingEngine {
    pub fn new(config: GroupingConfig) -> Self {
        Self {
            config,
            groups: Vec::new(),
            collapsed: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GroupingConfig {
        &self.config
    }

    /// Replace the configuration. Callers should `rebuild_groups` afterwards;
    /// existing groups reflect the old rules until they do.
    pub fn set_config(&mut self, config: GroupingConfig) {
        self.config = config;
    }

    /// Discard all groups and recompute them from an oldest-first event
    /// sequence. Pure and idempotent over its input.
    ///
    /// Collapsed view state survives for groups whose id still exists after
    /// recomputation. Disabled grouping or empty input yields an empty list.
    pub fn rebuild_groups(&mut self, events_oldest_first: &[CapturedEvent]) -> Vec<EventGroup> {
        self.groups.clear();

        if self.config.enabled && !events_oldest_first.is_empty() {
            let mut building: Vec<EventGroup> = Vec::new();

            for event in events_oldest_first {
                let previous = building.last().and_then(|g| g.events.last());
                let triggered = self.matches_trigger(&event.name);
                if self.starts_new_group(previous, event, triggered) {
                    building.push(open_group(event, triggered));
                } else {
                    let group = building.last_mut().expect("open group");
                    let mut member = event.clone();
                    member.group_id = Some(group.id.clone());
                    group.events.push(member);
                    group.end_time = event.timestamp;
                }
            }

            // Members and the group list both read newest-first for display.
            for group in &mut building {
                group.events.reverse();
            }
            building.reverse();
            self.groups = building;
        }

        // Carry collapsed state only for surviving group ids.
        let groups = &self.groups;
        self.collapsed.retain(|id, _| groups.iter().any(|g| &g.id == id));
        for group in &mut self.groups {
            group.collapsed = self.collapsed.get(&group.id).copied().unwrap_or(false);
        }

        self.groups.clone()
    }

    /// Incremental fast path: apply the start/continue rule to one new
    /// capture, which must be the newest event. Returns the id of the group
    /// the event landed in, or `None` when grouping is disabled.
    ///
    /// Sets `event.group_id` so the caller's stored copy matches the group
    /// membership.
    pub fn add_event(&mut self, event: &mut CapturedEvent) -> Option<GroupId> {
        if !self.config.enabled {
            return None;
        }

        let previous = self.groups.first().and_then(|g| g.events.first());
        let triggered = self.matches_trigger(&event.name);
        if self.starts_new_group(previous, event, triggered) {
            self.groups.insert(0, open_group(event, triggered));
        } else {
            let group = self.groups.first_mut().expect("open group");
            let mut member = event.clone();
            member.group_id = Some(group.id.clone());
            group.events.insert(0, member);
            group.end_time = event.timestamp;
        }

        let id = self.groups[0].id.clone();
        event.group_id = Some(id.clone());
        Some(id)
    }

    /// Current groups, newest first. Defensive copy.
    pub fn groups(&self) -> Vec<EventGroup> {
        self.groups.clone()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Flip a group's collapsed view state. Unknown ids are a no-op.
    pub fn toggle_collapsed(&mut self, id: &GroupId) {
        if let Some(group) = self.groups.iter_mut().find(|g| &g.id == id) {
            group.collapsed = !group.collapsed;
            self.collapsed.insert(id.clone(), group.collapsed);
        }
    }

    /// Drop all groups and view state.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.collapsed.clear();
    }

    fn starts_new_group(
        &self,
        previous: Option<&CapturedEvent>,
        event: &CapturedEvent,
        triggered: bool,
    ) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        match self.config.mode {
            GroupingMode::TimeWindow => {
                event.timestamp.elapsed_since(previous.timestamp) > self.config.time_window_ms
            }
            GroupingMode::TriggerEvent => triggered,
        }
    }

    fn matches_trigger(&self, name: &str) -> bool {
        if self.config.mode != GroupingMode::TriggerEvent {
            return false;
        }
        let name = name.to_lowercase();
        self.config
            .trigger_event_names
            .iter()
            .any(|t| name.contains(&t.to_lowercase()))
    }
}

/// Start a group whose first (oldest) member is `event`.
fn open_group(event: &CapturedEvent, triggered: bool) -> EventGroup {
    let id = GroupId::from_first_member(&event.id);
    let mut member = event.clone();
    member.group_id = Some(id.clone());
    EventGroup {
        id,
        events: vec![member],
        start_time: event.timestamp,
        end_time: event.timestamp,
        trigger_event_name: triggered.then(|| event.name.clone()),
        collapsed: false,
    }
}
