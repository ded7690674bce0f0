use std::future;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ProviderConfig, ProviderMetadata};
use crate::error::{ProviderError, Result};
use crate::messenger::{DecodeError, ListenerId, MessageBus, PopupMessage, WindowMessage};
use crate::model::{ConnectionInfo, ProviderInterface, SkappInfo};
use crate::popup::{identity_popup_url, permission_popup_url, PopupOpener, PopupRequest};
use crate::provider::{Provider, StateCell};
use crate::service::{IdentitySessionManager, PermissionManager};
use crate::store::{CredentialStore, KeyValueStore, LocalStorage};

/// Provider backed by a seed the user types into the identity popup. The seed stays in the
/// browser, the registry only ever sees documents signed with keys derived from it
pub struct IdentityProvider<K, L, P> {
    config: ProviderConfig,
    interface: ProviderInterface,
    base_url: Url,
    origin: String,
    sessions: IdentitySessionManager<K, L>,
    permissions: PermissionManager<K>,
    popups: P,
    bus: Arc<MessageBus>,
    state: StateCell,
    listeners: Mutex<Vec<ListenerId>>,
}

impl<K, L, P> IdentityProvider<K, L, P>
where
    K: KeyValueStore,
    L: LocalStorage,
    P: PopupOpener,
{
    pub fn interface_descriptor() -> ProviderInterface {
        ProviderInterface::new()
            .with_method("identity", &["string"])
            .with_method("isLoggedIn", &["bool"])
            .with_method("logout", &[])
    }

    /// `bus` is the message bus of the window hosting the provider
    pub fn new(config: ProviderConfig, store: Arc<K>, local: L, popups: P, bus: Arc<MessageBus>) -> anyhow::Result<Self> {
        let base_url = config.base_url()?;
        let origin = config.provider_origin()?;
        let credentials = CredentialStore::new(store, config.document_id(), config.store_timeout());

        Ok(Self {
            interface: Self::interface_descriptor(),
            base_url,
            origin,
            sessions: IdentitySessionManager::new(credentials.clone(), local, config.login_key.clone()),
            permissions: PermissionManager::new(credentials, config.permission_fetch_retries),
            popups,
            bus,
            state: StateCell::new(),
            listeners: Mutex::new(Vec::new()),
            config,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Origin popups and the connector post from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn connection(&self) -> Option<ConnectionInfo> {
        self.sessions.current()
    }

    /// Starts listening for connections the connector completes. Messages are to be handed to
    /// [`Provider::handle_forwarded`]. Torn down by `disconnect`
    pub fn init(&self) -> mpsc::UnboundedReceiver<WindowMessage> {
        let (id, receiver) = self.bus.subscribe(&self.origin);
        self.track(id);
        receiver
    }

    fn track(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(id);
        }
    }

    fn untrack(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|listener| *listener != id);
        }
    }

    fn popup_request(&self, url: Url) -> PopupRequest {
        PopupRequest::new(url, &self.config.metadata.name, self.config.popup_width, self.config.popup_height)
    }

    /// Opens a popup and waits for its single answer, read with `decode`. `None` when the window
    /// closed, or the listener was removed, before anything arrived
    async fn round_trip(
        &self,
        url: Url,
        decode: fn(&Value) -> std::result::Result<PopupMessage, DecodeError>,
    ) -> Result<Option<PopupMessage>> {
        let mut pending = self.bus.listen_once(&self.origin);
        let id = pending.id();
        self.track(id);

        let opened = self.popups.open(&self.popup_request(url));
        let mut window = match opened {
            Ok(window) => window,
            Err(error) => {
                self.untrack(id);
                return Err(error);
            }
        };

        let timeout = self.config.popup_timeout();
        let expired = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => future::pending::<()>().await,
            }
        };

        let received = tokio::select! {
            biased;
            message = pending.recv() => Ok(message),
            _ = window.closed() => Ok(None),
            _ = expired => Err(ProviderError::PopupTimeout),
        };
        self.untrack(id);
        drop(pending);

        let Some(message) = received? else {
            debug!(window = window.name(), "popup closed without answer");
            return Ok(None);
        };
        decode(&message.data)
            .map(Some)
            .map_err(|error| ProviderError::Validation(error.to_string()))
    }
}

fn unexpected(message: &PopupMessage) -> ProviderError {
    let kind = match message {
        PopupMessage::Identity(_) => "identity",
        PopupMessage::ConnectionComplete(_) => "connectionComplete",
        PopupMessage::Grant => "grant",
        PopupMessage::Deny => "deny",
        PopupMessage::Closed => "closed",
        PopupMessage::Error(_) => "error",
    };
    ProviderError::Validation(format!("unexpected popup answer '{kind}'"))
}

#[async_trait::async_trait]
impl<K, L, P> Provider for IdentityProvider<K, L, P>
where
    K: KeyValueStore,
    L: LocalStorage,
    P: PopupOpener,
{
    fn interface(&self) -> &ProviderInterface {
        &self.interface
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.config.metadata
    }

    fn state(&self) -> &StateCell {
        &self.state
    }

    async fn fetch_connection_info(&self) -> Result<Option<ConnectionInfo>> {
        self.sessions.fetch_connection_info().await
    }

    async fn save_connection_info(&self, info: ConnectionInfo) -> Result<ConnectionInfo> {
        self.sessions.save_connection_info(info).await
    }

    async fn clear_connection_info(&self) {
        self.sessions.clear_connection_info();
    }

    async fn fetch_skapp_permission(&self, info: &ConnectionInfo, skapp: &SkappInfo) -> Option<bool> {
        self.permissions.fetch_skapp_permission(info, skapp).await
    }

    async fn save_skapp_permission(&self, info: &ConnectionInfo, skapp: &SkappInfo, permission: bool) -> Result<()> {
        self.permissions.save_skapp_permission(info, skapp, permission).await
    }

    async fn query_user_for_connection(&self, skapp: &SkappInfo) -> Result<Option<ConnectionInfo>> {
        let url = identity_popup_url(&self.base_url, &self.config.identity_ui_path, skapp)?;
        match self.round_trip(url, PopupMessage::decode).await? {
            None | Some(PopupMessage::Closed) => Ok(None),
            Some(PopupMessage::Identity(info)) => {
                info.validate()?;
                Ok(Some(info))
            }
            Some(PopupMessage::Error(payload)) => Err(payload.into()),
            Some(other) => Err(unexpected(&other)),
        }
    }

    async fn query_user_for_skapp_permission(&self, skapp: &SkappInfo) -> Result<bool> {
        let url = permission_popup_url(&self.base_url, &self.config.permissions_ui_path, skapp, None)?;
        match self.round_trip(url, PopupMessage::decode_consent).await? {
            Some(PopupMessage::Grant) => Ok(true),
            Some(PopupMessage::Deny) => Ok(false),
            None | Some(PopupMessage::Closed) => Err(ProviderError::WindowClosedWithoutAnswer),
            Some(PopupMessage::Error(payload)) => Err(payload.into()),
            Some(other) => Err(unexpected(&other)),
        }
    }

    async fn invoke(&self, method: &str) -> Option<Result<Value>> {
        let result = match method {
            "identity" => self
                .sessions
                .current()
                .map(|info| Value::String(info.identity))
                .ok_or(ProviderError::NotConnected),
            "isLoggedIn" => Ok(Value::Bool(self.sessions.current().is_some())),
            "logout" => {
                self.disconnect().await;
                Ok(Value::Null)
            }
            _ => return None,
        };
        Some(result)
    }

    fn unregister_listeners(&self) {
        let Ok(mut listeners) = self.listeners.lock() else {
            warn!("listener registry poisoned");
            return;
        };
        for id in listeners.drain(..) {
            self.bus.remove_listener(id);
        }
    }
}
