//! # layerscope
//!
//! Event capture, routing, and persistence core for a dataLayer inspector.
//!
//! ## Core Concepts
//!
//! - **Captured events**: decoded pushes to a monitored page buffer,
//!   held newest-first in bounded per-tab buffers
//! - **Routing**: a typed request/response and broadcast protocol between
//!   isolated execution contexts, tolerant of context teardown
//! - **Grouping**: time- or trigger-bounded segmentation of the event
//!   sequence, recomputed on demand
//! - **Persistence**: TTL-bounded per-origin snapshots that survive page
//!   reloads and coordinator suspension
//!
//! ## Example
//!
//! ```ignore
//! use layerscope::{
//!     BackgroundCoordinator, CapturedEvent, EventManager, MessageRouter,
//!     MemoryStorage, SenderInfo, TabId, TransportHub,
//! };
//!
//! let hub = TransportHub::new();
//! let storage = Arc::new(MemoryStorage::new());
//!
//! let coordinator = Arc::new(BackgroundCoordinator::new(
//!     Arc::clone(&storage),
//!     Arc::new(hub.endpoint(SenderInfo::default())),
//! ));
//! hub.set_handler(coordinator.clone());
//!
//! let router = MessageRouter::new(Arc::new(
//!     hub.endpoint(SenderInfo::content_script(TabId(1), "https://example.com/")),
//! ));
//! let manager = EventManager::new("example.com", router, storage);
//! manager.initialize();
//!
//! manager.add_event(CapturedEvent::capture(
//!     "page_view",
//!     json!({"page": "/"}),
//!     json!({"event": "page_view", "page": "/"}),
//!     "dataLayer",
//!     0,
//! ));
//! ```

pub mod coordinator;
pub mod error;
pub mod filter;
pub mod grouping;
pub mod manager;
pub mod persist;
pub mod router;
pub mod settings;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use coordinator::BackgroundCoordinator;
pub use error::{CoreError, Result};
pub use filter::{FilterConfig, FilterEngine, FilterMode, FilterPatch};
pub use grouping::{GroupingConfig, GroupingEngine, GroupingMode};
pub use manager::{EventManager, ManagerPhase, DEFAULT_LOCAL_MAX_EVENTS};
pub use persist::{PersistenceConfig, PersistenceStore, PERSISTED_EVENTS_KEY_PREFIX};
pub use router::{
    BroadcastSubscription, ChannelTransport, Message, MessageRouter, RequestHandler, Responder,
    Response, SenderInfo, Transport, TransportError, TransportHub,
};
pub use settings::{
    InspectorSettings, OriginOverride, SettingsExport, SettingsPatch, SettingsStore,
    DOMAIN_SETTINGS_KEY, SETTINGS_EXPORT_VERSION, SETTINGS_KEY,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{EventStore, DEFAULT_MAX_EVENTS_PER_TAB};
pub use types::*;
