//! Structured channel between the provider iframe (child) and the host skapp (parent).
//!
//! The parent opens with `handshake-request`, the child answers `handshake-response` listing the
//! methods it exposes. From then on the parent sends `call`s which are answered by `response`s
//! carrying the same request id, and the child may push `event`s at any time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::data::id::{MessageId, MessageIdGenerator};
use crate::error::ErrorPayload;
use crate::messenger::{MessageSink, WindowMessage};

/// Context tag of ids minted by the provider side
const CHILD_CONTEXT: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallResult {
    Ok(Value),
    Err(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum HandshakeMessage {
    HandshakeRequest {
        session_id: MessageId,
    },
    HandshakeResponse {
        session_id: MessageId,
        methods: Vec<String>,
    },
    Call {
        session_id: MessageId,
        request_id: MessageId,
        call: Value,
    },
    Response {
        session_id: MessageId,
        request_id: MessageId,
        result: CallResult,
    },
    Event {
        session_id: MessageId,
        name: String,
        payload: Value,
    },
}

impl HandshakeMessage {
    fn session_id(&self) -> MessageId {
        match self {
            HandshakeMessage::HandshakeRequest { session_id }
            | HandshakeMessage::HandshakeResponse { session_id, .. }
            | HandshakeMessage::Call { session_id, .. }
            | HandshakeMessage::Response { session_id, .. }
            | HandshakeMessage::Event { session_id, .. } => *session_id,
        }
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A call received from the parent, still to be answered
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    pub request_id: MessageId,
    pub call: Value,
}

pub struct ChildHandshake {
    parent: Arc<dyn MessageSink>,
    methods: Vec<String>,
}

impl ChildHandshake {
    pub fn new(parent: Arc<dyn MessageSink>, methods: &[&str]) -> Self {
        Self {
            parent,
            methods: methods.iter().map(|method| method.to_string()).collect(),
        }
    }

    /// Waits for the parent to open the channel. `incoming` must only carry messages from origins
    /// trusted as the parent. `None` when the parent went away first
    pub async fn accept(self, mut incoming: mpsc::UnboundedReceiver<WindowMessage>) -> Option<HandshakeConnection> {
        while let Some(message) = incoming.recv().await {
            match serde_json::from_value::<HandshakeMessage>(message.data) {
                Ok(HandshakeMessage::HandshakeRequest { session_id }) => {
                    debug!(%session_id, origin = %message.origin, "handshake established");
                    let connection = HandshakeConnection {
                        session_id,
                        parent: self.parent,
                        parent_origin: message.origin,
                        methods: self.methods,
                        incoming,
                    };
                    connection.answer_handshake();
                    return Some(connection);
                }
                _ => trace!(origin = %message.origin, "ignoring message before handshake"),
            }
        }
        None
    }
}

pub struct HandshakeConnection {
    session_id: MessageId,
    parent: Arc<dyn MessageSink>,
    parent_origin: String,
    methods: Vec<String>,
    incoming: mpsc::UnboundedReceiver<WindowMessage>,
}

impl HandshakeConnection {
    pub fn session_id(&self) -> MessageId {
        self.session_id
    }

    fn send(&self, message: HandshakeMessage) {
        self.parent.post_message(message.to_value(), &self.parent_origin);
    }

    fn answer_handshake(&self) {
        self.send(HandshakeMessage::HandshakeResponse {
            session_id: self.session_id,
            methods: self.methods.clone(),
        });
    }

    /// Next call of this session. Foreign sessions and unknown shapes are dropped, a repeated
    /// handshake request is answered again. `None` when the parent went away
    pub async fn next_call(&mut self) -> Option<IncomingCall> {
        while let Some(message) = self.incoming.recv().await {
            let Ok(message) = serde_json::from_value::<HandshakeMessage>(message.data) else {
                continue;
            };
            if message.session_id() != self.session_id {
                trace!(session_id = %message.session_id(), "message for another session");
                continue;
            }
            match message {
                HandshakeMessage::Call { request_id, call, .. } => return Some(IncomingCall { request_id, call }),
                HandshakeMessage::HandshakeRequest { .. } => self.answer_handshake(),
                _ => {}
            }
        }
        None
    }

    pub fn respond(&self, request_id: MessageId, result: CallResult) {
        self.send(HandshakeMessage::Response { session_id: self.session_id, request_id, result });
    }

    pub fn local_handle(&self) -> LocalHandle {
        LocalHandle {
            session_id: self.session_id,
            parent: Arc::clone(&self.parent),
            parent_origin: self.parent_origin.clone(),
        }
    }
}

/// Emits events to the parent independently of any call
#[derive(Clone)]
pub struct LocalHandle {
    session_id: MessageId,
    parent: Arc<dyn MessageSink>,
    parent_origin: String,
}

impl LocalHandle {
    pub fn emit(&self, name: &str, payload: Value) {
        let event = HandshakeMessage::Event { session_id: self.session_id, name: name.to_string(), payload };
        self.parent.post_message(event.to_value(), &self.parent_origin);
    }
}

/// Fresh id for a handshake session or request
pub fn new_message_id() -> MessageId {
    MessageIdGenerator::new(CHILD_CONTEXT).generate()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::messenger::{MessageBus, ANY_ORIGIN};

    const HOST: &str = "https://skapp.hns.siasky.net";
    const PROVIDER: &str = "https://sky-id.hns.siasky.net";

    struct Windows {
        host: Arc<MessageBus>,
        provider: Arc<MessageBus>,
    }

    fn windows() -> Windows {
        Windows { host: MessageBus::new(HOST), provider: MessageBus::new(PROVIDER) }
    }

    fn request(session_id: MessageId) -> Value {
        HandshakeMessage::HandshakeRequest { session_id }.to_value()
    }

    #[tokio::test]
    async fn test_handshake_and_call() {
        let windows = windows();
        let (_, incoming) = windows.provider.subscribe(HOST);
        let (_, mut host_inbox) = windows.host.subscribe(PROVIDER);
        let to_provider = windows.provider.port(HOST);
        let session_id = new_message_id();

        to_provider.post_message(request(session_id), PROVIDER);
        let handshake = ChildHandshake::new(Arc::new(windows.host.port(PROVIDER)), &["getMetadata"]);
        let mut connection = handshake.accept(incoming).await.unwrap();
        assert_eq!(connection.session_id(), session_id);

        let answer: HandshakeMessage = serde_json::from_value(host_inbox.recv().await.unwrap().data).unwrap();
        assert_eq!(answer, HandshakeMessage::HandshakeResponse { session_id, methods: vec!["getMetadata".to_string()] });

        let request_id = new_message_id();
        let call = HandshakeMessage::Call { session_id, request_id, call: json!({ "method": "getMetadata" }) };
        to_provider.post_message(call.to_value(), PROVIDER);
        let incoming_call = connection.next_call().await.unwrap();
        assert_eq!(incoming_call.request_id, request_id);

        connection.respond(request_id, CallResult::Ok(json!(true)));
        let response: HandshakeMessage = serde_json::from_value(host_inbox.recv().await.unwrap().data).unwrap();
        assert_eq!(response, HandshakeMessage::Response { session_id, request_id, result: CallResult::Ok(json!(true)) });
    }

    #[tokio::test]
    async fn test_foreign_session_ignored() {
        let windows = windows();
        let (_, incoming) = windows.provider.subscribe(ANY_ORIGIN);
        let to_provider = windows.provider.port(HOST);
        let session_id = new_message_id();

        to_provider.post_message(json!("noise"), PROVIDER);
        to_provider.post_message(request(session_id), PROVIDER);
        let mut connection = ChildHandshake::new(Arc::new(windows.host.port(PROVIDER)), &[])
            .accept(incoming)
            .await
            .unwrap();

        let stranger = HandshakeMessage::Call { session_id: new_message_id(), request_id: new_message_id(), call: json!({}) };
        to_provider.post_message(stranger.to_value(), PROVIDER);
        let request_id = new_message_id();
        let mine = HandshakeMessage::Call { session_id, request_id, call: json!({}) };
        to_provider.post_message(mine.to_value(), PROVIDER);

        assert_eq!(connection.next_call().await.unwrap().request_id, request_id);
    }

    #[tokio::test]
    async fn test_emit_event() {
        let windows = windows();
        let (_, incoming) = windows.provider.subscribe(HOST);
        let (_, mut host_inbox) = windows.host.subscribe(PROVIDER);
        let session_id = new_message_id();
        windows.provider.port(HOST).post_message(request(session_id), PROVIDER);

        let connection = ChildHandshake::new(Arc::new(windows.host.port(PROVIDER)), &[])
            .accept(incoming)
            .await
            .unwrap();
        host_inbox.recv().await.unwrap();

        connection.local_handle().emit("connectionComplete", json!({ "ok": true }));
        let event: HandshakeMessage = serde_json::from_value(host_inbox.recv().await.unwrap().data).unwrap();
        assert_eq!(event, HandshakeMessage::Event {
            session_id,
            name: "connectionComplete".to_string(),
            payload: json!({ "ok": true }),
        });
    }

    #[test]
    fn test_wire_shape() {
        let session_id = MessageId::from(1u128);
        assert_eq!(request(session_id), json!({ "type": "handshake-request", "sessionId": session_id.as_hex() }));
    }
}
