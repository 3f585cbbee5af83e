//! Background coordinator: the per-tab authority.
//!
//! Owns one event buffer per tab plus the settings tables, and answers
//! every request kind in the message taxonomy. Its in-memory state is
//! ephemeral by contract — the process can be suspended and restarted
//! between any two messages — so everything that must survive flows
//! through durable storage, and a fresh coordinator starts empty.

use crate::router::{
    Message, MessageRouter, RequestHandler, Responder, Response, SenderInfo, Transport,
};
use crate::settings::{SettingsPatch, SettingsStore};
use crate::storage::KeyValueStorage;
use crate::store::EventStore;
use crate::types::{CapturedEvent, TabId};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Capacity of the hostname-parse cache.
const DOMAIN_CACHE_SIZE: usize = 64;

/// Central request handler owning per-tab event state and settings.
pub struct BackgroundCoordinator {
    events: EventStore,
    settings: SettingsStore,
    router: MessageRouter,
    domain_cache: Mutex<LruCache<String, Option<String>>>,
}

impl BackgroundCoordinator {
    /// Build a coordinator over durable storage and a transport endpoint.
    ///
    /// Settings are reloaded from storage; the event store starts empty,
    /// which is the suspension contract — nothing in memory is assumed to
    /// survive a restart.
    pub fn new(storage: Arc<dyn KeyValueStorage>, transport: Arc<dyn Transport>) -> Self {
        let settings = SettingsStore::load(storage);
        let events = EventStore::new(settings.global().max_events_per_tab);

        // The store's change notification is the relay choke point: every
        // successful insertion fans out to the viewer surfaces.
        let relay = MessageRouter::new(Arc::clone(&transport));
        events.set_on_change(Box::new(move |tab_id, snapshot| {
            relay.broadcast_events_updated(tab_id, snapshot.to_vec());
        }));

        let cache_size = NonZeroUsize::new(DOMAIN_CACHE_SIZE).expect("nonzero cache size");

        Self {
            events,
            settings,
            router: MessageRouter::new(transport),
            domain_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// The per-tab event store (for embedding and tests).
    pub fn event_store(&self) -> &EventStore {
        &self.events
    }

    /// The settings tables (for embedding and tests).
    pub fn settings_store(&self) -> &SettingsStore {
        &self.settings
    }

    /// Evict a closed tab's buffer entirely.
    pub fn handle_tab_removed(&self, tab_id: TabId) {
        self.events.remove_tab(tab_id);
    }

    /// Best-effort hostname extraction. Unparseable URLs yield `None`,
    /// never an error.
    pub fn extract_domain(&self, url: &str) -> Option<String> {
        let mut cache = self.domain_cache.lock();
        if let Some(cached) = cache.get(url) {
            return cached.clone();
        }

        let domain = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_lowercase));
        cache.put(url.to_string(), domain.clone());
        domain
    }

    /// Resolve the origin a request is scoped to: the explicit field wins,
    /// then the sender's URL hostname.
    fn resolve_origin(&self, explicit: Option<&str>, sender: &SenderInfo) -> Option<String> {
        if let Some(domain) = explicit {
            if !domain.is_empty() {
                return Some(domain.to_lowercase());
            }
        }
        sender
            .url
            .as_deref()
            .and_then(|url| self.extract_domain(url))
    }

    fn handle_ingestion(
        &self,
        tab_id: Option<TabId>,
        event: CapturedEvent,
        sender: &SenderInfo,
    ) -> Response {
        let Some(tab) = tab_id.or(sender.tab_id) else {
            // A missing tab id is a no-op, not an error.
            debug!(name = %event.name, "ingestion without resolvable tab id, dropped");
            return Response::Ack { success: false };
        };

        self.events.add_event(tab, event.clone());
        self.router.broadcast_event_added(tab, event);
        Response::Ack { success: true }
    }

    fn handle_clear(&self, tab_id: Option<TabId>, sender: &SenderInfo) -> Response {
        match tab_id.or(sender.tab_id) {
            Some(tab) => {
                self.events.clear_events(tab);
                self.router.broadcast_events_updated(tab, Vec::new());
            }
            None => {
                let tabs = self.events.tab_ids();
                self.events.clear_all();
                for tab in tabs {
                    self.router.broadcast_events_updated(tab, Vec::new());
                }
            }
        }
        Response::Ack { success: true }
    }

    fn handle_update_settings(
        &self,
        patch: SettingsPatch,
        domain: Option<String>,
        save_global: bool,
        sender: &SenderInfo,
    ) -> Response {
        if save_global {
            match self.settings.update_global(&patch) {
                Ok(updated) => {
                    self.events.set_max_events_per_tab(updated.max_events_per_tab);
                    self.router.broadcast_settings_updated(updated);
                    Response::Ack { success: true }
                }
                Err(e) => Response::failure(e.to_string()),
            }
        } else {
            let Some(origin) = self.resolve_origin(domain.as_deref(), sender) else {
                return Response::failure("no origin to scope settings to");
            };
            match self.settings.set_override(&origin, patch) {
                Ok(_) => {
                    self.router.broadcast_settings_updated(self.settings.global());
                    Response::Ack { success: true }
                }
                Err(e) => Response::failure(e.to_string()),
            }
        }
    }

    /// Exhaustive dispatch over the message taxonomy. Broadcast-only kinds
    /// arriving as requests resolve to a structured failure rather than
    /// silence, so no caller ever hangs on an unrecognized message.
    fn dispatch(&self, message: Message, sender: &SenderInfo) -> Response {
        match message {
            Message::GetEvents { tab_id } => Response::Events {
                events: self.events.get_events(tab_id),
            },

            Message::ClearEvents { tab_id } => self.handle_clear(tab_id, sender),

            Message::GetSettings { domain } => {
                let settings = match self.resolve_origin(domain.as_deref(), sender) {
                    Some(origin) => self.settings.merged_for_origin(&origin),
                    None => self.settings.global(),
                };
                Response::Settings { settings }
            }

            Message::UpdateSettings {
                patch,
                domain,
                save_global,
            } => self.handle_update_settings(patch, domain, save_global, sender),

            Message::GetDomainSettings => Response::DomainSettings {
                domain_settings: self.settings.all_overrides(),
                global_settings: self.settings.global(),
            },

            Message::DeleteDomainSettings { domain } => {
                match self.settings.delete_override(&domain.to_lowercase()) {
                    Ok(existed) => {
                        if existed {
                            self.router.broadcast_settings_updated(self.settings.global());
                        }
                        Response::Ack { success: existed }
                    }
                    Err(e) => Response::failure(e.to_string()),
                }
            }

            Message::ExportAllSettings => Response::Exported {
                bundle: self.settings.export_all(),
            },

            Message::ImportAllSettings { bundle } => match self.settings.import_all(bundle) {
                Ok(()) => {
                    let global = self.settings.global();
                    self.events.set_max_events_per_tab(global.max_events_per_tab);
                    self.router.broadcast_settings_updated(global);
                    Response::Ack { success: true }
                }
                Err(e) => Response::failure(e.to_string()),
            },

            Message::Ping => Response::Pong {
                enabled: self.settings.global().enabled,
            },

            Message::DataLayerEvent { tab_id, event } => {
                self.handle_ingestion(tab_id, event, sender)
            }

            Message::EventAdded { .. }
            | Message::EventsUpdated { .. }
            | Message::SettingsUpdated { .. } => Response::failure("not a request"),
        }
    }
}

impl RequestHandler for BackgroundCoordinator {
    fn handle(&self, message: Message, sender: SenderInfo, responder: Responder) {
        responder.respond(self.dispatch(message, &sender));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::TransportHub;
    use crate::settings::InspectorSettings;
    use crate::storage::MemoryStorage;

    fn make_event(name: &str) -> CapturedEvent {
        CapturedEvent::capture(
            name,
            serde_json::json!({"event": name}),
            serde_json::json!({"event": name}),
            "dataLayer",
            0,
        )
    }

    fn coordinator() -> (TransportHub, Arc<BackgroundCoordinator>) {
        let hub = TransportHub::new();
        let coordinator = Arc::new(BackgroundCoordinator::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(hub.endpoint(SenderInfo::default())),
        ));
        hub.set_handler(Arc::clone(&coordinator) as Arc<dyn RequestHandler>);
        (hub, coordinator)
    }

    fn content_router(hub: &TransportHub, tab: TabId) -> MessageRouter {
        MessageRouter::new(Arc::new(hub.endpoint(SenderInfo::content_script(
            tab,
            format!("https://example.com/page{}", tab.0),
        ))))
    }

    #[test]
    fn test_ingestion_resolves_tab_from_sender() {
        let (hub, coordinator) = coordinator();
        let router = content_router(&hub, TabId(7));

        assert!(router.send_event(None, make_event("page_view")));
        assert_eq!(coordinator.event_store().get_event_count(TabId(7)), 1);
    }

    #[test]
    fn test_ingestion_without_tab_is_dropped() {
        let (hub, coordinator) = coordinator();
        let router = MessageRouter::new(Arc::new(hub.endpoint(SenderInfo::viewer())));

        assert!(!router.send_event(None, make_event("page_view")));
        assert!(coordinator.event_store().tab_ids().is_empty());
    }

    #[test]
    fn test_tab_removed_evicts_buffer() {
        let (hub, coordinator) = coordinator();
        let router = content_router(&hub, TabId(3));
        router.send_event(None, make_event("a"));

        coordinator.handle_tab_removed(TabId(3));
        assert!(coordinator.event_store().get_events(TabId(3)).is_empty());
        assert!(coordinator.event_store().tab_ids().is_empty());
    }

    #[test]
    fn test_get_settings_merges_origin_override() {
        let (hub, _coordinator) = coordinator();
        let router = content_router(&hub, TabId(1));

        // Disable capture for example.com only.
        assert!(router.update_settings(
            SettingsPatch {
                enabled: Some(false),
                ..Default::default()
            },
            None,
            false,
        ));

        // The sender's URL resolves the origin.
        let merged = router.get_settings(None).unwrap();
        assert!(!merged.enabled);

        // Another origin still sees the global default.
        let other = router.get_settings(Some("other.org")).unwrap();
        assert!(other.enabled);
    }

    #[test]
    fn test_update_settings_global_changes_capacity() {
        let (hub, coordinator) = coordinator();
        let router = content_router(&hub, TabId(1));

        assert!(router.update_settings(
            SettingsPatch {
                max_events_per_tab: Some(2),
                ..Default::default()
            },
            None,
            true,
        ));
        assert_eq!(coordinator.event_store().max_events_per_tab(), 2);
    }

    #[test]
    fn test_extract_domain_is_best_effort() {
        let (_hub, coordinator) = coordinator();
        assert_eq!(
            coordinator.extract_domain("https://Example.COM/path?q=1"),
            Some("example.com".to_string())
        );
        assert_eq!(coordinator.extract_domain("not a url"), None);
        // Cached path returns the same answer.
        assert_eq!(coordinator.extract_domain("not a url"), None);
    }

    #[test]
    fn test_broadcast_only_kind_as_request_fails() {
        let (hub, _coordinator) = coordinator();
        let endpoint = hub.endpoint(SenderInfo::viewer());
        let response = endpoint
            .request(Message::SettingsUpdated {
                settings: InspectorSettings::default(),
            })
            .unwrap();
        assert!(!response.is_success());
    }

    #[test]
    fn test_clear_events_scopes_to_sender_tab() {
        let (hub, coordinator) = coordinator();
        let tab_a = content_router(&hub, TabId(1));
        let tab_b = content_router(&hub, TabId(2));
        tab_a.send_event(None, make_event("a"));
        tab_b.send_event(None, make_event("b"));

        assert!(tab_a.clear_events(None));
        assert_eq!(coordinator.event_store().get_event_count(TabId(1)), 0);
        assert_eq!(coordinator.event_store().get_event_count(TabId(2)), 1);

        // A viewer with no tab clears everything.
        let viewer = MessageRouter::new(Arc::new(hub.endpoint(SenderInfo::viewer())));
        assert!(viewer.clear_events(None));
        assert_eq!(coordinator.event_store().get_event_count(TabId(2)), 0);
    }

    #[test]
    fn test_ingestion_relays_to_subscribers() {
        let (hub, _coordinator) = coordinator();
        let viewer = hub.endpoint(SenderInfo::viewer());
        let subscription = viewer.subscribe();

        let router = content_router(&hub, TabId(5));
        router.send_event(None, make_event("page_view"));

        // Both the single-event add and the full-snapshot update go out.
        let mut kinds = Vec::new();
        while let Ok(message) = subscription.try_recv() {
            kinds.push(message);
        }
        assert!(kinds
            .iter()
            .any(|m| matches!(m, Message::EventAdded { tab_id, .. } if *tab_id == TabId(5))));
        assert!(kinds
            .iter()
            .any(|m| matches!(m, Message::EventsUpdated { tab_id, events } if *tab_id == TabId(5) && events.len() == 1)));
    }
}
