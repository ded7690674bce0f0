//! Connection protocol between a skapp and a provider.
//!
//! [`Provider`] carries the state machine shared by every provider: silent and interactive
//! connects, disconnects and calls into the capability interface. Implementors supply the session
//! and permission storage, the popups used to ask the user, and the interface methods themselves.

pub mod identity;
pub mod state;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::ProviderMetadata;
use crate::error::{ProviderError, Result};
use crate::messenger::handshake::LocalHandle;
use crate::messenger::{PopupMessage, WindowMessage};
use crate::model::{ConnectionInfo, ProviderInterface, SkappInfo};

pub use identity::IdentityProvider;
pub use state::{ConnectionState, StateCell};

/// Event emitted to the host once a connection finished outside of a host call
pub const CONNECTION_COMPLETE_EVENT: &str = "connectionComplete";

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn interface(&self) -> &ProviderInterface;

    fn metadata(&self) -> &ProviderMetadata;

    fn state(&self) -> &StateCell;

    async fn fetch_connection_info(&self) -> Result<Option<ConnectionInfo>>;

    async fn save_connection_info(&self, info: ConnectionInfo) -> Result<ConnectionInfo>;

    async fn clear_connection_info(&self);

    /// `None` when the user was never asked or the answer cannot be read
    async fn fetch_skapp_permission(&self, info: &ConnectionInfo, skapp: &SkappInfo) -> Option<bool>;

    async fn save_skapp_permission(&self, info: &ConnectionInfo, skapp: &SkappInfo, permission: bool) -> Result<()>;

    /// Asks the user for a seed. `None` when the user walked away
    async fn query_user_for_connection(&self, skapp: &SkappInfo) -> Result<Option<ConnectionInfo>>;

    /// Asks the user to grant or deny `skapp`. Walking away is an error, never a denial
    async fn query_user_for_skapp_permission(&self, skapp: &SkappInfo) -> Result<bool>;

    /// Runs an interface method. `None` when the provider has no implementation for it
    async fn invoke(&self, method: &str) -> Option<Result<Value>>;

    /// Removes every message listener this provider registered
    fn unregister_listeners(&self);

    /// Connects using stored state only, never opening a window
    async fn connect_silently(&self, skapp: &SkappInfo) -> Result<Option<ProviderInterface>> {
        let result = connect(self, skapp, Interaction::Silent).await;
        settle(self, skapp, &result);
        result
    }

    /// Connects, asking the user through popups for whatever is missing
    async fn connect_with_input(&self, skapp: &SkappInfo) -> Result<Option<ProviderInterface>> {
        let result = connect(self, skapp, Interaction::Prompt).await;
        settle(self, skapp, &result);
        result
    }

    /// Finishes a connection made in the connector window, where the permission was already
    /// settled
    async fn complete_connection(&self, info: ConnectionInfo) -> Result<ProviderInterface> {
        let result = match info.validate() {
            Ok(()) => self.save_connection_info(info).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(info) => {
                self.state().transition(ConnectionState::Connected);
                info!(identity = %info.identity, "connection completed by connector");
                Ok(self.interface().clone())
            }
            Err(error) => {
                self.state().transition(ConnectionState::Failed);
                Err(error)
            }
        }
    }

    async fn disconnect(&self) {
        self.clear_connection_info().await;
        self.unregister_listeners();
        self.state().transition(ConnectionState::Disconnected);
    }

    async fn call_interface(&self, method: &str) -> Result<Value> {
        if !self.state().get().is_connected() {
            return Err(ProviderError::NotConnected);
        }
        if !self.interface().contains(method) {
            return Err(ProviderError::UnsupportedMethod(method.to_string()));
        }
        match self.invoke(method).await {
            Some(result) => result,
            None => {
                error!(method, "interface method has no implementation");
                Err(ProviderError::UnimplementedMethod(method.to_string()))
            }
        }
    }

    /// Handles a message forwarded from the connector window. Returns whether it completed a
    /// connection, in which case the host is told through `events`
    async fn handle_forwarded(&self, message: &WindowMessage, events: &LocalHandle) -> Result<bool> {
        let Ok(PopupMessage::ConnectionComplete(info)) = PopupMessage::decode(&message.data) else {
            return Ok(false);
        };
        let interface = self.complete_connection(info).await?;
        events.emit(CONNECTION_COMPLETE_EVENT, json!({ "providerInterface": interface, "metadata": self.metadata() }));
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interaction {
    Silent,
    Prompt,
}

/// Session resolution strictly precedes permission resolution
async fn connect<P>(provider: &P, skapp: &SkappInfo, interaction: Interaction) -> Result<Option<ProviderInterface>>
where
    P: Provider + ?Sized,
{
    provider.state().transition(ConnectionState::AwaitingSession);
    let info = match provider.fetch_connection_info().await? {
        Some(info) => info,
        None if interaction == Interaction::Silent => return Ok(None),
        None => match provider.query_user_for_connection(skapp).await? {
            Some(info) => provider.save_connection_info(info).await?,
            None => {
                debug!(domain = %skapp.domain, "identity popup closed without a seed");
                return Ok(None);
            }
        },
    };

    provider.state().transition(ConnectionState::AwaitingConsent);
    match provider.fetch_skapp_permission(&info, skapp).await {
        Some(true) => {}
        _ if interaction == Interaction::Silent => return Ok(None),
        _ => {
            let permission = provider.query_user_for_skapp_permission(skapp).await?;
            if !permission {
                if let Err(error) = provider.save_skapp_permission(&info, skapp, false).await {
                    warn!(domain = %skapp.domain, %error, "denied permission could not be recorded");
                }
                return Err(ProviderError::PermissionDenied);
            }
            provider.save_skapp_permission(&info, skapp, true).await?;
        }
    }

    Ok(Some(provider.interface().clone()))
}

fn settle<P>(provider: &P, skapp: &SkappInfo, result: &Result<Option<ProviderInterface>>)
where
    P: Provider + ?Sized,
{
    let next = match result {
        Ok(Some(_)) => ConnectionState::Connected,
        Ok(None) => ConnectionState::Idle,
        Err(_) => ConnectionState::Failed,
    };
    provider.state().transition(next);
    match result {
        Ok(Some(_)) => info!(domain = %skapp.domain, "skapp connected"),
        Ok(None) => debug!(domain = %skapp.domain, "no connection obtained"),
        Err(error) => debug!(domain = %skapp.domain, %error, "connection failed"),
    }
}
