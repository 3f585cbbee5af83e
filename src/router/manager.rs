//! Per-context message router.
//!
//! Wraps the injected transport with typed helpers whose failure behavior
//! is fixed: a transport error degrades to a documented fallback value, and
//! a context-invalidation error additionally latches the router invalid so
//! every later call short-circuits until the context is rebuilt.

use super::transport::{BroadcastSubscription, Transport, TransportError};
use super::types::{Message, Response};
use crate::settings::{InspectorSettings, OriginOverride, SettingsExport, SettingsPatch};
use crate::types::{CapturedEvent, TabId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Typed request/response and broadcast surface for one context.
pub struct MessageRouter {
    transport: Arc<dyn Transport>,
    valid: AtomicBool,
}

impl MessageRouter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            valid: AtomicBool::new(true),
        }
    }

    /// False once a call has hit context invalidation; the router stays
    /// unusable until reconstructed.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Listen for broadcasts on the underlying transport.
    pub fn subscribe(&self) -> BroadcastSubscription {
        self.transport.subscribe()
    }

    // --- Request helpers ---

    /// Events buffered for a tab. Falls back to an empty sequence.
    pub fn get_events(&self, tab_id: TabId) -> Vec<CapturedEvent> {
        self.request(Message::GetEvents { tab_id }, Vec::new, |response| {
            match response {
                Response::Events { events } => Some(events),
                _ => None,
            }
        })
    }

    /// Clear one tab's buffer (or the sender's own tab when `None`).
    /// Falls back to false.
    pub fn clear_events(&self, tab_id: Option<TabId>) -> bool {
        self.request(Message::ClearEvents { tab_id }, || false, |response| {
            Some(response.is_success())
        })
    }

    /// Settings merged for an origin. Falls back to `None`; callers use
    /// their local defaults.
    pub fn get_settings(&self, domain: Option<&str>) -> Option<InspectorSettings> {
        self.request(
            Message::GetSettings {
                domain: domain.map(str::to_string),
            },
            || None,
            |response| match response {
                Response::Settings { settings } => Some(Some(settings)),
                _ => None,
            },
        )
    }

    /// Apply a settings patch globally or to an origin override.
    /// Falls back to false.
    pub fn update_settings(
        &self,
        patch: SettingsPatch,
        domain: Option<&str>,
        save_global: bool,
    ) -> bool {
        self.request(
            Message::UpdateSettings {
                patch,
                domain: domain.map(str::to_string),
                save_global,
            },
            || false,
            |response| Some(response.is_success()),
        )
    }

    /// Every origin override plus the current global settings.
    /// Falls back to `None`.
    pub fn get_domain_settings(&self) -> Option<(Vec<OriginOverride>, InspectorSettings)> {
        self.request(Message::GetDomainSettings, || None, |response| {
            match response {
                Response::DomainSettings {
                    domain_settings,
                    global_settings,
                } => Some(Some((domain_settings, global_settings))),
                _ => None,
            }
        })
    }

    /// Delete an origin's override. Falls back to false.
    pub fn delete_domain_settings(&self, domain: &str) -> bool {
        self.request(
            Message::DeleteDomainSettings {
                domain: domain.to_string(),
            },
            || false,
            |response| Some(response.is_success()),
        )
    }

    /// Export every settings table. Falls back to `None`.
    pub fn export_all_settings(&self) -> Option<SettingsExport> {
        self.request(Message::ExportAllSettings, || None, |response| {
            match response {
                Response::Exported { bundle } => Some(Some(bundle)),
                _ => None,
            }
        })
    }

    /// Replace every settings table from a bundle. Falls back to false.
    pub fn import_all_settings(&self, bundle: SettingsExport) -> bool {
        self.request(
            Message::ImportAllSettings { bundle },
            || false,
            |response| Some(response.is_success()),
        )
    }

    /// Liveness probe. `Some(enabled)` when the coordinator answered.
    pub fn ping(&self) -> Option<bool> {
        self.request(Message::Ping, || None, |response| match response {
            Response::Pong { enabled } => Some(Some(enabled)),
            _ => None,
        })
    }

    /// Relay a captured event to the coordinator. The explicit tab id is
    /// normally absent; the transport's sender identity resolves it.
    /// Falls back to false.
    pub fn send_event(&self, tab_id: Option<TabId>, event: CapturedEvent) -> bool {
        self.request(
            Message::DataLayerEvent { tab_id, event },
            || false,
            |response| Some(response.is_success()),
        )
    }

    // --- Broadcast helpers ---

    /// Notify listeners that a tab's buffer changed. Fire-and-forget.
    pub fn broadcast_events_updated(&self, tab_id: TabId, events: Vec<CapturedEvent>) {
        self.fire(Message::EventsUpdated { tab_id, events });
    }

    /// Notify listeners of a single new event. Fire-and-forget.
    pub fn broadcast_event_added(&self, tab_id: TabId, event: CapturedEvent) {
        self.fire(Message::EventAdded { tab_id, event });
    }

    /// Notify listeners that settings changed. Fire-and-forget.
    pub fn broadcast_settings_updated(&self, settings: InspectorSettings) {
        self.fire(Message::SettingsUpdated { settings });
    }

    // --- Internals ---

    /// Run one request with a fixed fallback. `map` narrows the expected
    /// response kind; anything else (including `Failure`) falls back.
    fn request<T>(
        &self,
        message: Message,
        fallback: impl FnOnce() -> T,
        map: impl FnOnce(Response) -> Option<T>,
    ) -> T {
        if !self.is_valid() {
            return fallback();
        }

        match self.transport.request(message) {
            Ok(response) => map(response).unwrap_or_else(fallback),
            Err(e) => {
                self.note_failure(&e);
                fallback()
            }
        }
    }

    fn fire(&self, message: Message) {
        if !self.is_valid() {
            return;
        }
        if let Err(e) = self.transport.broadcast(message) {
            self.note_failure(&e);
        }
    }

    fn note_failure(&self, error: &TransportError) {
        if *error == TransportError::ContextInvalidated {
            self.valid.store(false, Ordering::SeqCst);
            debug!("transport invalidated; router degraded to no-op");
        } else {
            debug!(error = %error, "transport call failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::transport::{RequestHandler, Responder, TransportHub};
    use crate::router::types::SenderInfo;

    struct EchoHandler;

    impl RequestHandler for EchoHandler {
        fn handle(&self, message: Message, _sender: SenderInfo, responder: Responder) {
            let response = match message {
                Message::Ping => Response::Pong { enabled: true },
                Message::GetEvents { .. } => Response::Events { events: Vec::new() },
                _ => Response::Ack { success: true },
            };
            responder.respond(response);
        }
    }

    fn router_with_handler() -> (TransportHub, MessageRouter) {
        let hub = TransportHub::new();
        hub.set_handler(Arc::new(EchoHandler));
        let router = MessageRouter::new(Arc::new(hub.endpoint(SenderInfo::viewer())));
        (hub, router)
    }

    #[test]
    fn test_typed_helpers() {
        let (_hub, router) = router_with_handler();
        assert_eq!(router.ping(), Some(true));
        assert!(router.get_events(TabId(1)).is_empty());
        assert!(router.clear_events(Some(TabId(1))));
    }

    #[test]
    fn test_no_receiver_degrades_without_latching() {
        let hub = TransportHub::new();
        let router = MessageRouter::new(Arc::new(hub.endpoint(SenderInfo::viewer())));

        assert_eq!(router.ping(), None);
        assert!(router.get_events(TabId(1)).is_empty());
        // A missing coordinator is transient; the router stays valid.
        assert!(router.is_valid());

        hub.set_handler(Arc::new(EchoHandler));
        assert_eq!(router.ping(), Some(true));
    }

    #[test]
    fn test_invalidation_latches() {
        let (hub, router) = router_with_handler();
        assert_eq!(router.ping(), Some(true));

        hub.invalidate();
        assert_eq!(router.ping(), None);
        assert!(!router.is_valid());

        // Latch holds even though a handler is still registered.
        assert!(!router.clear_events(None));
        assert!(router.get_settings(None).is_none());
    }

    #[test]
    fn test_unexpected_response_shape_falls_back() {
        struct WrongShape;
        impl RequestHandler for WrongShape {
            fn handle(&self, _message: Message, _sender: SenderInfo, responder: Responder) {
                responder.respond(Response::Ack { success: true });
            }
        }

        let hub = TransportHub::new();
        hub.set_handler(Arc::new(WrongShape));
        let router = MessageRouter::new(Arc::new(hub.endpoint(SenderInfo::viewer())));

        // Pong expected, Ack received: fall back rather than misread.
        assert_eq!(router.ping(), None);
    }
}
