//! Wire message taxonomy for cross-context communication.
//!
//! Everything that crosses a context boundary is one of these closed,
//! exhaustively-matched unions. There is no untyped payload narrowing; a
//! message that fails to decode never reaches a handler.

use crate::settings::{InspectorSettings, OriginOverride, SettingsExport, SettingsPatch};
use crate::types::{CapturedEvent, TabId};
use serde::{Deserialize, Serialize};

/// A message between execution contexts.
///
/// Request kinds expect a [`Response`]; broadcast kinds are fire-and-forget
/// with zero-to-many listeners. `DataLayerEvent` is the one-way ingestion
/// message from content scripts into the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    // --- Request/response ---
    GetEvents {
        tab_id: TabId,
    },

    /// Clear one tab's buffer, or every buffer when `tab_id` is absent and
    /// the sender has no tab of its own.
    ClearEvents {
        tab_id: Option<TabId>,
    },

    /// Fetch settings merged for an origin; falls back to the sender's URL
    /// hostname when `domain` is absent.
    GetSettings {
        domain: Option<String>,
    },

    /// Apply a settings patch to the global store (`save_global`) or to the
    /// origin-override store.
    UpdateSettings {
        patch: SettingsPatch,
        domain: Option<String>,
        save_global: bool,
    },

    GetDomainSettings,

    DeleteDomainSettings {
        domain: String,
    },

    ExportAllSettings,

    ImportAllSettings {
        bundle: SettingsExport,
    },

    Ping,

    // --- Broadcast-only ---
    EventAdded {
        tab_id: TabId,
        event: CapturedEvent,
    },

    EventsUpdated {
        tab_id: TabId,
        events: Vec<CapturedEvent>,
    },

    SettingsUpdated {
        settings: InspectorSettings,
    },

    // --- One-way ingestion ---
    #[serde(rename = "DATALAYER_EVENT")]
    DataLayerEvent {
        tab_id: Option<TabId>,
        event: CapturedEvent,
    },
}

impl Message {
    /// Whether this kind participates in request/response (including the
    /// ingestion message, which is acknowledged on the wire).
    pub fn expects_response(&self) -> bool {
        !matches!(
            self,
            Message::EventAdded { .. }
                | Message::EventsUpdated { .. }
                | Message::SettingsUpdated { .. }
        )
    }
}

/// Reply to a request, carrying only the fields relevant to that request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Events {
        events: Vec<CapturedEvent>,
    },

    Settings {
        settings: InspectorSettings,
    },

    DomainSettings {
        domain_settings: Vec<OriginOverride>,
        global_settings: InspectorSettings,
    },

    Exported {
        bundle: SettingsExport,
    },

    Ack {
        success: bool,
    },

    Pong {
        enabled: bool,
    },

    /// Structured failure; callers' futures always resolve, never hang.
    Failure {
        success: bool,
        error: Option<String>,
    },
}

impl Response {
    /// A failure response with an explanation.
    pub fn failure(error: impl Into<String>) -> Self {
        Response::Failure {
            success: false,
            error: Some(error.into()),
        }
    }

    /// A failure response with no explanation.
    pub fn failure_silent() -> Self {
        Response::Failure {
            success: false,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Response::Ack { success } => *success,
            Response::Failure { .. } => false,
            _ => true,
        }
    }
}

/// Identity the transport attaches to every request; never chosen by the
/// calling code itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SenderInfo {
    /// Tab the sending context lives in, when it has one.
    pub tab_id: Option<TabId>,

    /// URL the sending context is displaying, when it has one.
    pub url: Option<String>,
}

impl SenderInfo {
    /// A content script running in a tab.
    pub fn content_script(tab_id: TabId, url: impl Into<String>) -> Self {
        Self {
            tab_id: Some(tab_id),
            url: Some(url.into()),
        }
    }

    /// A viewer surface (popup, devtools panel, sidepanel) with no tab
    /// identity of its own.
    pub fn viewer() -> Self {
        Self::default()
    }
}
