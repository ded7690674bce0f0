//! Method surface exposed to the host skapp over the handshake channel.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{ErrorKind, ErrorPayload};
use crate::messenger::handshake::{CallResult, ChildHandshake, HandshakeConnection, IncomingCall};
use crate::messenger::{ListenerId, MessageBus, MessageSink, WindowMessage};
use crate::model::SkappInfo;
use crate::provider::Provider;

pub const METHODS: [&str; 5] = ["callInterface", "connectSilently", "connectWithInput", "disconnect", "getMetadata"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCall {
    CallInterface { method: String },
    ConnectSilently { skapp_info: SkappInfo },
    ConnectWithInput { skapp_info: SkappInfo },
    Disconnect,
    GetMetadata,
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Runs one host call against the provider. Errors cross back as an [`ErrorPayload`] only
pub async fn dispatch<P>(provider: &P, call: Value) -> CallResult
where
    P: Provider + ?Sized,
{
    let call = match serde_json::from_value::<HostCall>(call) {
        Ok(call) => call,
        Err(error) => return CallResult::Err(ErrorPayload::new(ErrorKind::Validation, format!("invalid call: {error}"))),
    };

    let result = match call {
        HostCall::CallInterface { method } => provider.call_interface(&method).await,
        HostCall::ConnectSilently { skapp_info } => provider.connect_silently(&skapp_info).await.map(to_value),
        HostCall::ConnectWithInput { skapp_info } => provider.connect_with_input(&skapp_info).await.map(to_value),
        HostCall::Disconnect => {
            provider.disconnect().await;
            Ok(Value::Null)
        }
        HostCall::GetMetadata => Ok(to_value(provider.metadata())),
    };

    match result {
        Ok(value) => CallResult::Ok(value),
        Err(error) => CallResult::Err(ErrorPayload::from(&error)),
    }
}

/// Listens for the host at the configured host origin right away. The future resolves once the host
/// opened the handshake channel, the listener stays registered until removed from `bus`
pub fn accept_host(
    bus: &MessageBus,
    config: &ProviderConfig,
    host: Arc<dyn MessageSink>,
) -> (ListenerId, impl Future<Output = Option<HandshakeConnection>> + Send + 'static) {
    let (id, incoming) = bus.subscribe(&config.host_origin);
    debug!(host_origin = %config.host_origin, "waiting for host handshake");
    (id, ChildHandshake::new(host, &METHODS).accept(incoming))
}

/// Answers host calls and resumes connections forwarded by the connector until the host
/// channel closes
pub async fn serve<P>(provider: &P, mut connection: HandshakeConnection, mut forwarded: tokio::sync::mpsc::UnboundedReceiver<WindowMessage>)
where
    P: Provider + ?Sized,
{
    let events = connection.local_handle();
    let mut forwarding = true;

    loop {
        tokio::select! {
            call = connection.next_call() => {
                let Some(IncomingCall { request_id, call }) = call else {
                    debug!(session_id = %connection.session_id(), "host channel closed");
                    return;
                };
                let result = dispatch(provider, call).await;
                connection.respond(request_id, result);
            }
            message = forwarded.recv(), if forwarding => match message {
                Some(message) => {
                    if let Err(error) = provider.handle_forwarded(&message, &events).await {
                        warn!(%error, "forwarded connection could not be completed");
                    }
                }
                None => forwarding = false,
            },
        }
    }
}
