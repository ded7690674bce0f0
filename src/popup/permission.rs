use url::Url;

use crate::error::{ErrorPayload, ProviderError, Result};
use crate::messenger::{MessageSink, PopupMessage};
use crate::model::{ConnectionInfo, SkappInfo};
use crate::popup::PopupParams;
use crate::service::PermissionManager;
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionView {
    /// Connector mode only, looking up an earlier answer
    Fetching,
    Requesting,
    Granted,
    Denied,
    /// An error or `closed` was posted
    Finished,
}

/// Consent page. Opened directly by the provider it only reports the choice, which the provider
/// then records. Opened by the connector it carries the login and records the choice itself
pub struct PermissionPopup<S> {
    view: PermissionView,
    opener: S,
    opener_origin: String,
    skapp: Option<SkappInfo>,
    login: Option<ConnectionInfo>,
}

fn denied() -> ErrorPayload {
    ErrorPayload::from(ProviderError::PermissionDenied)
}

impl<S: MessageSink> PermissionPopup<S> {
    /// Direct mode, the provider records the answer
    pub fn load(opener: S, opener_origin: impl Into<String>, url: &Url) -> Self {
        let mut popup = Self::blank(opener, opener_origin, PermissionView::Requesting);
        match PopupParams::from_url(url) {
            Ok(params) => popup.skapp = Some(params.skapp),
            Err(error) => popup.fail(error),
        }
        popup
    }

    /// Connector mode. Call [`PermissionPopup::fetch`] next to skip the prompt when the user
    /// already answered
    pub fn load_connector(opener: S, opener_origin: impl Into<String>, url: &Url) -> Self {
        let mut popup = Self::blank(opener, opener_origin, PermissionView::Fetching);
        match PopupParams::from_url_with_login(url) {
            Ok(params) => {
                popup.skapp = Some(params.skapp);
                popup.login = params.login;
            }
            Err(error) => popup.fail(error),
        }
        popup
    }

    fn blank(opener: S, opener_origin: impl Into<String>, view: PermissionView) -> Self {
        Self {
            view,
            opener,
            opener_origin: opener_origin.into(),
            skapp: None,
            login: None,
        }
    }

    pub fn view(&self) -> PermissionView {
        self.view
    }

    /// Domain shown to the user in the consent prompt
    pub fn skapp(&self) -> Option<&SkappInfo> {
        self.skapp.as_ref()
    }

    fn is_done(&self) -> bool {
        matches!(self.view, PermissionView::Granted | PermissionView::Denied | PermissionView::Finished)
    }

    fn post(&mut self, message: PopupMessage, view: PermissionView) {
        self.opener.post_message(message.to_value(), &self.opener_origin);
        self.view = view;
    }

    fn answered(&mut self, permission: bool) {
        match (self.login.clone(), permission) {
            (Some(login), true) => self.post(PopupMessage::ConnectionComplete(login), PermissionView::Granted),
            (Some(_), false) => self.post(PopupMessage::Error(denied()), PermissionView::Denied),
            (None, true) => self.post(PopupMessage::Grant, PermissionView::Granted),
            (None, false) => self.post(PopupMessage::Deny, PermissionView::Denied),
        }
    }

    /// Looks up an earlier answer. Only an unknown permission leads to the prompt
    pub async fn fetch<K: KeyValueStore>(&mut self, permissions: &PermissionManager<K>) {
        if self.view != PermissionView::Fetching {
            return;
        }
        let fetched = match (&self.login, &self.skapp) {
            (Some(login), Some(skapp)) => permissions.fetch_skapp_permission(login, skapp).await,
            _ => return,
        };
        match fetched {
            Some(permission) => self.answered(permission),
            None => self.view = PermissionView::Requesting,
        }
    }

    fn ensure_requesting(&self) -> Result<()> {
        if self.view != PermissionView::Requesting {
            return Err(ProviderError::Validation(format!("no pending request, current view is {:?}", self.view)));
        }
        Ok(())
    }

    /// Records the choice when a login was passed along, then reports it
    async fn choose<K: KeyValueStore>(&mut self, permissions: Option<&PermissionManager<K>>, permission: bool) -> Result<()> {
        self.ensure_requesting()?;
        let saved = match (&self.login, &self.skapp, permissions) {
            (Some(login), Some(skapp), Some(permissions)) => {
                permissions.save_skapp_permission(login, skapp, permission).await
            }
            _ => Ok(()),
        };
        if let Err(error) = saved {
            self.fail(ErrorPayload::from(&error));
            return Err(error);
        }
        self.answered(permission);
        Ok(())
    }

    pub async fn grant<K: KeyValueStore>(&mut self, permissions: Option<&PermissionManager<K>>) -> Result<()> {
        self.choose(permissions, true).await
    }

    pub async fn deny<K: KeyValueStore>(&mut self, permissions: Option<&PermissionManager<K>>) -> Result<()> {
        self.choose(permissions, false).await
    }

    pub fn fail(&mut self, error: ErrorPayload) {
        if !self.is_done() {
            self.post(PopupMessage::Error(error), PermissionView::Finished);
        }
    }

    /// Unload before a choice. The opener must not read this as a denial
    pub fn close(&mut self) {
        if !self.is_done() {
            self.post(PopupMessage::Closed, PermissionView::Finished);
        }
    }
}
