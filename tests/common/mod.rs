#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use skyid_core::crypto::{gen_key_pair_from_seed, Seed};
use skyid_core::data::id::MessageId;
use skyid_core::messenger::handshake::{new_message_id, CallResult, HandshakeMessage};
use skyid_core::messenger::{MessageBus, MessageSink, WindowMessage, WindowPort};
use skyid_core::popup::{IdentityPopup, PermissionPopup, PopupOpener, PopupRequest, WindowCloser, WindowHandle};
use skyid_core::service::{IdentitySessionManager, PermissionManager};
use skyid_core::store::{CredentialStore, MemoryKeyValueStore, MemoryLocalStorage};
use skyid_core::{IdentityProvider, ProviderConfig, ProviderError, ProviderMetadata, Result};
use tokio::sync::mpsc::UnboundedReceiver;

pub const PROVIDER_URL: &str = "https://sky-id.hns.siasky.net/";
pub const PROVIDER: &str = "https://sky-id.hns.siasky.net";
pub const HOST: &str = "https://skapp.hns.siasky.net";

/// What the user does in the next popup
#[derive(Debug, Clone)]
pub enum Page {
    SignUp { seed: String, username: String },
    SignIn { seed: String },
    CloseIdentity,
    Grant,
    Deny,
    ClosePermission,
    /// Posts raw data, as a broken or outdated popup would
    Post(Value),
    /// Never answers and stays open
    Hang,
}

impl Page {
    pub fn sign_up(seed: &str, username: &str) -> Self {
        Page::SignUp { seed: seed.to_string(), username: username.to_string() }
    }

    pub fn sign_in(seed: &str) -> Self {
        Page::SignIn { seed: seed.to_string() }
    }
}

struct Inner {
    bus: Arc<MessageBus>,
    script: Mutex<VecDeque<Page>>,
    opened: Mutex<Vec<PopupRequest>>,
    open_windows: Mutex<Vec<WindowCloser>>,
}

/// Popup opener running the real popup pages against a script of user actions
#[derive(Clone)]
pub struct ScriptedPopups {
    inner: Arc<Inner>,
}

impl ScriptedPopups {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                script: Mutex::new(VecDeque::new()),
                opened: Mutex::new(Vec::new()),
                open_windows: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn script(&self, pages: impl IntoIterator<Item = Page>) {
        self.inner.script.lock().unwrap().extend(pages);
    }

    pub fn opened(&self) -> Vec<PopupRequest> {
        self.inner.opened.lock().unwrap().clone()
    }

    pub fn opened_count(&self) -> usize {
        self.inner.opened.lock().unwrap().len()
    }

    pub async fn wait_opened(&self, count: usize) {
        while self.opened_count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Closes every window left open by a `Hang` page
    pub fn close_all(&self) {
        self.inner.open_windows.lock().unwrap().clear();
    }
}

async fn run_page(page: Page, port: WindowPort, url: url::Url, closer: WindowCloser) {
    match page {
        Page::SignUp { seed, username } => {
            let mut popup = IdentityPopup::load(port, PROVIDER, &url);
            popup.go_to_sign_up();
            popup.sign_up(&seed, &username).unwrap();
            popup.close();
        }
        Page::SignIn { seed } => {
            let mut popup = IdentityPopup::load(port, PROVIDER, &url);
            popup.go_to_sign_in();
            popup.sign_in(&seed).unwrap();
            popup.close();
        }
        Page::CloseIdentity => IdentityPopup::load(port, PROVIDER, &url).close(),
        Page::Grant => {
            let mut popup = PermissionPopup::load(port, PROVIDER, &url);
            popup.grant::<MemoryKeyValueStore>(None).await.unwrap();
            popup.close();
        }
        Page::Deny => {
            let mut popup = PermissionPopup::load(port, PROVIDER, &url);
            popup.deny::<MemoryKeyValueStore>(None).await.unwrap();
            popup.close();
        }
        Page::ClosePermission => PermissionPopup::load(port, PROVIDER, &url).close(),
        Page::Post(data) => port.post_message(data, PROVIDER),
        Page::Hang => unreachable!("hanging pages are not run"),
    }
    closer.close();
}

impl PopupOpener for ScriptedPopups {
    fn open(&self, request: &PopupRequest) -> Result<WindowHandle> {
        self.inner.opened.lock().unwrap().push(request.clone());
        let page = self
            .inner
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::PopupBlocked(format!("unexpected popup {}", request.url)))?;

        let (handle, closer) = WindowHandle::new(&request.name);
        if let Page::Hang = page {
            self.inner.open_windows.lock().unwrap().push(closer);
            return Ok(handle);
        }

        let port = self.inner.bus.port(PROVIDER);
        tokio::spawn(run_page(page, port, request.url.clone(), closer));
        Ok(handle)
    }
}

pub type TestProvider = IdentityProvider<MemoryKeyValueStore, Arc<MemoryLocalStorage>, ScriptedPopups>;

pub fn metadata() -> ProviderMetadata {
    ProviderMetadata {
        name: "SkyID".to_string(),
        url: PROVIDER_URL.to_string(),
        relative_connector_path: "connector.html".to_string(),
        connector_name: "SkyID Connector".to_string(),
        connector_w: 600,
        connector_h: 600,
    }
}

/// One browser: the registry, local storage and the provider iframe of a page load
pub struct Browser {
    pub store: Arc<MemoryKeyValueStore>,
    pub local: Arc<MemoryLocalStorage>,
    pub bus: Arc<MessageBus>,
    pub popups: ScriptedPopups,
    pub provider: Arc<TestProvider>,
}

impl Browser {
    pub fn fresh() -> Self {
        Self::with_store(Arc::new(MemoryKeyValueStore::new()))
    }

    /// A new device sharing the registry
    pub fn with_store(store: Arc<MemoryKeyValueStore>) -> Self {
        Self::load(store, Arc::new(MemoryLocalStorage::new()))
    }

    /// A page load reusing the registry and local storage
    pub fn load(store: Arc<MemoryKeyValueStore>, local: Arc<MemoryLocalStorage>) -> Self {
        let bus = MessageBus::new(PROVIDER);
        let popups = ScriptedPopups::new(Arc::clone(&bus));
        let mut config = ProviderConfig::new(metadata());
        config.host_origin = HOST.to_string();
        let provider = IdentityProvider::new(
            config,
            Arc::clone(&store),
            Arc::clone(&local),
            popups.clone(),
            Arc::clone(&bus),
        )
        .unwrap();

        Self { store, local, bus, popups, provider: Arc::new(provider) }
    }

    pub fn reload(&self) -> Self {
        Self::load(Arc::clone(&self.store), Arc::clone(&self.local))
    }

    pub fn permissions(&self) -> PermissionManager<MemoryKeyValueStore> {
        let store = CredentialStore::new(Arc::clone(&self.store), PROVIDER_URL, Duration::from_secs(10));
        PermissionManager::new(store, 0)
    }

    /// Session manager of a connector window on this device
    pub fn sessions(&self) -> IdentitySessionManager<MemoryKeyValueStore, Arc<MemoryLocalStorage>> {
        let store = CredentialStore::new(Arc::clone(&self.store), PROVIDER_URL, Duration::from_secs(10));
        IdentitySessionManager::new(store, Arc::clone(&self.local), "loginSeed")
    }

    pub async fn identity_record(&self, seed: &str) -> Option<Value> {
        let store = CredentialStore::new(Arc::clone(&self.store), PROVIDER_URL, Duration::from_secs(10));
        let keys = gen_key_pair_from_seed(&Seed::from(seed));
        store.get_json(&keys.public_key).await.unwrap()
    }
}

/// The skapp window embedding the provider
pub struct Host {
    pub bus: Arc<MessageBus>,
    pub inbox: UnboundedReceiver<WindowMessage>,
    pub to_provider: WindowPort,
    pub session_id: MessageId,
    pub events: Vec<(String, Value)>,
}

impl Host {
    pub fn new(provider_bus: &Arc<MessageBus>) -> Self {
        let bus = MessageBus::new(HOST);
        let (_, inbox) = bus.subscribe(PROVIDER);
        Self {
            to_provider: provider_bus.port(HOST),
            bus,
            inbox,
            session_id: new_message_id(),
            events: Vec::new(),
        }
    }

    /// What the provider uses to reach this window
    pub fn sink(&self) -> Arc<dyn MessageSink> {
        Arc::new(self.bus.port(PROVIDER))
    }

    async fn next(&mut self) -> HandshakeMessage {
        let message = self.inbox.recv().await.unwrap();
        serde_json::from_value(message.data).unwrap()
    }

    pub async fn handshake(&mut self) -> Vec<String> {
        let request = HandshakeMessage::HandshakeRequest { session_id: self.session_id };
        self.to_provider.post_message(serde_json::to_value(request).unwrap(), PROVIDER);
        match self.next().await {
            HandshakeMessage::HandshakeResponse { methods, .. } => methods,
            other => panic!("expected handshake response, got {other:?}"),
        }
    }

    pub async fn call(&mut self, call: Value) -> CallResult {
        let request_id = new_message_id();
        let message = HandshakeMessage::Call { session_id: self.session_id, request_id, call };
        self.to_provider.post_message(serde_json::to_value(message).unwrap(), PROVIDER);
        loop {
            match self.next().await {
                HandshakeMessage::Response { request_id: answered, result, .. } if answered == request_id => return result,
                HandshakeMessage::Event { name, payload, .. } => self.events.push((name, payload)),
                _ => {}
            }
        }
    }

    pub async fn next_event(&mut self) -> (String, Value) {
        if !self.events.is_empty() {
            return self.events.remove(0);
        }
        loop {
            if let HandshakeMessage::Event { name, payload, .. } = self.next().await {
                return (name, payload);
            }
        }
    }
}

pub fn skapp_call(method: &str, name: &str, domain: &str) -> Value {
    json!({ "method": method, "args": { "skappInfo": { "name": name, "domain": domain } } })
}
