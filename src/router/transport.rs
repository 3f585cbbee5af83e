//! Transport capability between execution contexts.
//!
//! The host messaging API is reduced to the [`Transport`] trait: the core
//! depends only on send/broadcast/subscribe, never on a concrete browser
//! surface. [`TransportHub`] is the in-process implementation used by tests
//! and headless embeddings; it also simulates the two failure modes that
//! matter — context invalidation and coordinator teardown.

use super::types::{Message, Response, SenderInfo};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Max buffered broadcasts per subscriber before it is dropped.
const DEFAULT_BROADCAST_BUFFER: usize = 256;

/// How long a request waits for a reply before giving up.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport-level failures. All of them degrade to a defined fallback at
/// the router layer; none propagate into the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The sending context was torn down; the transport is gone for good.
    #[error("context invalidated")]
    ContextInvalidated,

    /// No counterpart is listening for requests.
    #[error("no receiving end")]
    NoReceiver,

    /// The handler kept the channel open but never replied.
    #[error("request timed out")]
    Timeout,

    /// The handler dropped its reply slot without responding.
    #[error("channel closed before a reply was sent")]
    Closed,
}

/// One-shot reply slot handed to the request handler.
///
/// A synchronous handler responds before returning; an asynchronous one
/// moves the responder elsewhere and responds later. Dropping it without
/// responding closes the caller's channel, which surfaces as
/// [`TransportError::Closed`] instead of a hung caller.
pub struct Responder {
    slot: Sender<Response>,
}

impl Responder {
    /// Send the reply. Returns false if the caller already gave up.
    pub fn respond(self, response: Response) -> bool {
        self.slot.send(response).is_ok()
    }
}

/// Receiver side of a request/response exchange.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, message: Message, sender: SenderInfo, responder: Responder);
}

/// Handle for receiving broadcasts.
pub struct BroadcastSubscription {
    pub id: u64,
    receiver: Receiver<Message>,
}

impl BroadcastSubscription {
    /// Receive the next broadcast (blocking).
    pub fn recv(&self) -> Result<Message, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a broadcast (non-blocking).
    pub fn try_recv(&self) -> Result<Message, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Message, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Message-transport capability injected into every context.
pub trait Transport: Send + Sync {
    /// Send a request and wait for its reply.
    fn request(&self, message: Message) -> Result<Response, TransportError>;

    /// Fire-and-forget notification to every subscriber. No delivery
    /// confirmation.
    fn broadcast(&self, message: Message) -> Result<(), TransportError>;

    /// Listen for broadcasts.
    fn subscribe(&self) -> BroadcastSubscription;
}

struct HubInner {
    handler: RwLock<Option<Arc<dyn RequestHandler>>>,
    subscribers: RwLock<HashMap<u64, Sender<Message>>>,
    next_subscriber_id: AtomicU64,
    invalidated: AtomicBool,
    request_timeout: Duration,
}

/// In-process transport hub connecting any number of context endpoints to
/// one request handler.
#[derive(Clone)]
pub struct TransportHub {
    inner: Arc<HubInner>,
}

impl TransportHub {
    pub fn new() -> Self {
        Self::with_request_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_request_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                handler: RwLock::new(None),
                subscribers: RwLock::new(HashMap::new()),
                next_subscriber_id: AtomicU64::new(1),
                invalidated: AtomicBool::new(false),
                request_timeout: timeout,
            }),
        }
    }

    /// Register the request handler (the coordinator). Replaces any
    /// previous one.
    pub fn set_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.inner.handler.write() = Some(handler);
    }

    /// Drop the request handler, simulating coordinator suspension: the
    /// transport stays up but requests find no receiving end.
    pub fn clear_handler(&self) {
        *self.inner.handler.write() = None;
    }

    /// Flip the hub into the context-invalidated failure mode, simulating
    /// teardown of the sending context.
    pub fn invalidate(&self) {
        self.inner.invalidated.store(true, Ordering::SeqCst);
    }

    /// Create an endpoint for one context. The endpoint attaches `sender`
    /// to every request it forwards.
    pub fn endpoint(&self, sender: SenderInfo) -> ChannelTransport {
        ChannelTransport {
            inner: Arc::clone(&self.inner),
            sender,
        }
    }
}

impl Default for TransportHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A context's connection to the hub.
pub struct ChannelTransport {
    inner: Arc<HubInner>,
    sender: SenderInfo,
}

impl Transport for ChannelTransport {
    fn request(&self, message: Message) -> Result<Response, TransportError> {
        if self.inner.invalidated.load(Ordering::SeqCst) {
            return Err(TransportError::ContextInvalidated);
        }

        let handler = self
            .inner
            .handler
            .read()
            .clone()
            .ok_or(TransportError::NoReceiver)?;

        let (slot, reply) = bounded(1);
        handler.handle(message, self.sender.clone(), Responder { slot });

        match reply.recv_timeout(self.inner.request_timeout) {
            Ok(response) => Ok(response),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
        }
    }

    fn broadcast(&self, message: Message) -> Result<(), TransportError> {
        if self.inner.invalidated.load(Ordering::SeqCst) {
            return Err(TransportError::ContextInvalidated);
        }

        let mut to_remove = Vec::new();
        {
            let subscribers = self.inner.subscribers.read();
            for (id, sender) in subscribers.iter() {
                if sender.try_send(message.clone()).is_err() {
                    to_remove.push(*id);
                }
            }
        }

        // Drop subscribers that disconnected or fell too far behind.
        if !to_remove.is_empty() {
            let mut subscribers = self.inner.subscribers.write();
            for id in to_remove {
                subscribers.remove(&id);
                debug!(subscriber = id, "dropped broadcast subscriber");
            }
        }

        Ok(())
    }

    fn subscribe(&self) -> BroadcastSubscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = bounded(DEFAULT_BROADCAST_BUFFER);
        self.inner.subscribers.write().insert(id, sender);
        BroadcastSubscription { id, receiver }
    }
}
