//! Cross-context messaging.
//!
//! Execution contexts (content scripts, the background coordinator, viewer
//! surfaces) are mutually isolated and any of them can be torn down and
//! recreated at arbitrary times. This module is everything that crosses
//! that boundary:
//!
//! - A closed, typed message taxonomy (requests, broadcasts, ingestion)
//! - The [`Transport`] capability trait and an in-process hub
//! - [`MessageRouter`], the per-context wrapper that degrades every
//!   failure to a defined fallback instead of throwing or hanging
//!
//! # Example
//!
//! ```ignore
//! let hub = TransportHub::new();
//! hub.set_handler(coordinator);
//!
//! let router = MessageRouter::new(Arc::new(
//!     hub.endpoint(SenderInfo::content_script(TabId(1), "https://example.com/")),
//! ));
//!
//! router.send_event(None, event);
//! let settings = router.get_settings(Some("example.com"));
//! ```

mod manager;
mod transport;
mod types;

pub use manager::MessageRouter;
pub use transport::{
    BroadcastSubscription, ChannelTransport, RequestHandler, Responder, Transport, TransportError,
    TransportHub,
};
pub use types::{Message, Response, SenderInfo};
