//! Cross-window messaging.
//!
//! Every window context owns a [`MessageBus`]. Other windows reach it through a [`WindowPort`],
//! which stamps the sender's origin on every message the way a browser does for `postMessage`.
//! Listeners name the origin they trust; anything else is dropped without a trace reaching the
//! sender.

pub mod handshake;
pub mod message;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

pub use message::{DecodeError, PopupMessage};

/// Wildcard accepted as a target origin and as an expected origin
pub const ANY_ORIGIN: &str = "*";

#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub origin: String,
    pub data: Value,
}

impl WindowMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self { origin: origin.into(), data }
    }
}

/// Outbound side of `postMessage`, what a window holds of another window
pub trait MessageSink: Send + Sync {
    fn post_message(&self, data: Value, target_origin: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

enum Delivery {
    Once(oneshot::Sender<WindowMessage>),
    Stream(mpsc::UnboundedSender<WindowMessage>),
}

struct Registration {
    id: ListenerId,
    expected_origin: String,
    delivery: Delivery,
}

fn origin_matches(expected: &str, origin: &str) -> bool {
    expected == ANY_ORIGIN || expected == origin
}

/// Message listeners of one window context
pub struct MessageBus {
    origin: String,
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
}

impl MessageBus {
    pub fn new(origin: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            origin: origin.into(),
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Origin of the window owning this bus
    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn register(&self, expected_origin: &str, delivery: Delivery) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Registration { id, expected_origin: expected_origin.to_string(), delivery });
        }
        id
    }

    /// Registers a listener consuming the first message from `expected_origin`, then removing
    /// itself. Dropping the returned [`PendingMessage`] removes it as well
    pub fn listen_once(self: &Arc<Self>, expected_origin: &str) -> PendingMessage {
        let (sender, receiver) = oneshot::channel();
        let id = self.register(expected_origin, Delivery::Once(sender));
        PendingMessage { id, receiver, bus: Arc::clone(self) }
    }

    /// Registers a listener receiving every message from `expected_origin` until removed
    pub fn subscribe(&self, expected_origin: &str) -> (ListenerId, mpsc::UnboundedReceiver<WindowMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.register(expected_origin, Delivery::Stream(sender));
        (id, receiver)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|listeners| listeners.len()).unwrap_or(0)
    }

    /// Hands a message to every listener trusting its origin and returns how many took it
    pub fn dispatch(&self, message: WindowMessage) -> usize {
        let Ok(mut listeners) = self.listeners.lock() else {
            return 0;
        };

        let mut delivered = 0;
        let mut kept = Vec::with_capacity(listeners.len());
        for registration in listeners.drain(..) {
            if !origin_matches(&registration.expected_origin, &message.origin) {
                trace!(origin = %message.origin, expected = %registration.expected_origin, "dropping message from untrusted origin");
                kept.push(registration);
                continue;
            }
            match registration.delivery {
                Delivery::Once(sender) => {
                    if sender.send(message.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                Delivery::Stream(ref sender) => {
                    if sender.send(message.clone()).is_ok() {
                        delivered += 1;
                        kept.push(registration);
                    }
                }
            }
        }
        *listeners = kept;
        delivered
    }

    /// Handle through which a window at `sender_origin` posts messages to this bus
    pub fn port(self: &Arc<Self>, sender_origin: impl Into<String>) -> WindowPort {
        WindowPort { bus: Arc::clone(self), sender_origin: sender_origin.into() }
    }
}

/// A one-shot listener waiting for its message
pub struct PendingMessage {
    id: ListenerId,
    receiver: oneshot::Receiver<WindowMessage>,
    bus: Arc<MessageBus>,
}

impl PendingMessage {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// `None` once the listener was removed without a message
    pub async fn recv(&mut self) -> Option<WindowMessage> {
        (&mut self.receiver).await.ok()
    }
}

impl Drop for PendingMessage {
    fn drop(&mut self) {
        self.bus.remove_listener(self.id);
    }
}

/// Another window's reference to a bus
#[derive(Clone)]
pub struct WindowPort {
    bus: Arc<MessageBus>,
    sender_origin: String,
}

impl WindowPort {
    pub fn target_origin(&self) -> &str {
        self.bus.origin()
    }
}

impl MessageSink for WindowPort {
    fn post_message(&self, data: Value, target_origin: &str) {
        // Browsers silently discard messages whose target origin does not match the receiver
        if !origin_matches(target_origin, self.bus.origin()) {
            trace!(target_origin, origin = %self.bus.origin(), "target origin mismatch, message discarded");
            return;
        }
        self.bus.dispatch(WindowMessage::new(self.sender_origin.clone(), data));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const PROVIDER: &str = "https://sky-id.hns.siasky.net";
    const EVIL: &str = "https://evil.example";

    #[tokio::test]
    async fn test_listen_once_consumes_single_message() {
        let bus = MessageBus::new(PROVIDER);
        let mut pending = bus.listen_once(PROVIDER);

        let port = bus.port(PROVIDER);
        port.post_message(json!("grant"), PROVIDER);
        port.post_message(json!("deny"), PROVIDER);

        assert_eq!(pending.recv().await.unwrap().data, json!("grant"));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_origin_mismatch_dropped_listener_kept() {
        let bus = MessageBus::new(PROVIDER);
        let mut pending = bus.listen_once(PROVIDER);

        assert_eq!(bus.port(EVIL).post_message_counted(json!("grant")), 0);
        assert_eq!(bus.listener_count(), 1);

        bus.port(PROVIDER).post_message(json!("deny"), ANY_ORIGIN);
        assert_eq!(pending.recv().await.unwrap().data, json!("deny"));
    }

    #[test]
    fn test_target_origin_enforced() {
        let bus = MessageBus::new(PROVIDER);
        let (_, mut receiver) = bus.subscribe(ANY_ORIGIN);

        bus.port(PROVIDER).post_message(json!("closed"), EVIL);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_subscription_until_removed() {
        let bus = MessageBus::new(PROVIDER);
        let (id, mut receiver) = bus.subscribe(PROVIDER);
        let port = bus.port(PROVIDER);

        port.post_message(json!(1), PROVIDER);
        port.post_message(json!(2), PROVIDER);
        assert_eq!(receiver.try_recv().unwrap().data, json!(1));
        assert_eq!(receiver.try_recv().unwrap().data, json!(2));

        assert!(bus.remove_listener(id));
        port.post_message(json!(3), PROVIDER);
        assert!(receiver.try_recv().is_err());
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_dropping_pending_deregisters() {
        let bus = MessageBus::new(PROVIDER);
        let pending = bus.listen_once(PROVIDER);
        assert_eq!(bus.listener_count(), 1);
        drop(pending);
        assert_eq!(bus.listener_count(), 0);
    }

    impl WindowPort {
        fn post_message_counted(&self, data: Value) -> usize {
            self.bus.dispatch(WindowMessage::new(self.sender_origin.clone(), data))
        }
    }
}
