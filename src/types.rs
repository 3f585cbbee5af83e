//! Core types for the capture pipeline.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Browser tab identity; the partition key for captured events.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(pub u32);

impl fmt::Debug for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TabId({})", self.0)
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_millis() as i64)
    }

    /// Milliseconds elapsed since an earlier timestamp.
    pub fn elapsed_since(&self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Number of random alphanumeric characters in an event id suffix.
const EVENT_ID_SUFFIX_LEN: usize = 8;

/// Unique identifier for a captured event.
///
/// Composite of capture time and a random suffix, so ids stay unique
/// across buffers and across page reloads.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a fresh id for an event captured at `timestamp`.
    pub fn generate(timestamp: Timestamp) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(EVENT_ID_SUFFIX_LEN)
            .map(char::from)
            .collect();
        EventId(format!("{}-{}", timestamp.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an event group, derived from its first member.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    /// Derive the group id from the id of the group's first member.
    pub fn from_first_member(id: &EventId) -> Self {
        GroupId(format!("grp-{}", id.0))
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an event came from.
///
/// `persisted` is set exactly once, by the persistence layer at load time,
/// and distinguishes reload-survivors from fresh captures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    /// Name of the monitored page buffer (e.g. `dataLayer`).
    pub buffer: String,

    /// True if this event was reloaded from durable storage.
    pub persisted: bool,
}

impl EventSource {
    /// A freshly captured, not-yet-persisted event source.
    pub fn live(buffer: impl Into<String>) -> Self {
        Self {
            buffer: buffer.into(),
            persisted: false,
        }
    }
}

/// One decoded push to a monitored page buffer; the atomic unit the core
/// manages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// Unique identifier (assigned at capture time).
    pub id: EventId,

    /// When the push was captured.
    pub timestamp: Timestamp,

    /// Event-type string (e.g. `gtm.js`, `page_view`).
    pub name: String,

    /// Structured payload decoded from the push.
    pub payload: serde_json::Value,

    /// Originating buffer plus the persisted/live distinction.
    pub source: EventSource,

    /// Original unprocessed push value.
    pub raw_push: serde_json::Value,

    /// Position in the origin buffer at capture time.
    pub sequence_index: u64,

    /// Set by the grouping engine when grouping is enabled.
    pub group_id: Option<GroupId>,
}

impl CapturedEvent {
    /// Build an event for a push captured right now.
    pub fn capture(
        name: impl Into<String>,
        payload: serde_json::Value,
        raw_push: serde_json::Value,
        buffer: impl Into<String>,
        sequence_index: u64,
    ) -> Self {
        let timestamp = Timestamp::now();
        Self {
            id: EventId::generate(timestamp),
            timestamp,
            name: name.into(),
            payload,
            source: EventSource::live(buffer),
            raw_push,
            sequence_index,
            group_id: None,
        }
    }
}

/// A derived, display-ordered segment of the event sequence.
///
/// Groups are recomputed from the events they were derived from and never
/// outlive them; they are never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventGroup {
    pub id: GroupId,

    /// Member events, newest first.
    pub events: Vec<CapturedEvent>,

    pub start_time: Timestamp,
    pub end_time: Timestamp,

    /// Name of the event that opened this group, when a trigger rule did.
    pub trigger_event_name: Option<String>,

    /// Transient view state; never persisted.
    #[serde(skip)]
    pub collapsed: bool,
}

/// Durable per-origin snapshot of captured events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Stored events, newest first, capped at the persistence limit.
    pub events: Vec<CapturedEvent>,

    /// When the snapshot was last written.
    pub last_updated: Timestamp,
}
