use url::Url;

use crate::error::{ErrorPayload, ProviderError, Result};
use crate::messenger::{MessageSink, PopupMessage};
use crate::model::{ConnectionInfo, SkappInfo};
use crate::popup::{permission_popup_url, PopupParams};
use crate::service::IdentitySessionManager;
use crate::store::{KeyValueStore, LocalStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityView {
    LoggedOut,
    SignIn,
    SignUp,
    /// Something was posted to the opener, the page is done
    Submitted,
}

/// Page collecting a seed. Exactly one message reaches the opener: the connection info, an error,
/// or `closed` when the window goes away first
pub struct IdentityPopup<S> {
    view: IdentityView,
    opener: S,
    opener_origin: String,
    skapp: Option<SkappInfo>,
}

impl<S: MessageSink> IdentityPopup<S> {
    pub fn new(opener: S, opener_origin: impl Into<String>) -> Self {
        Self {
            view: IdentityView::LoggedOut,
            opener,
            opener_origin: opener_origin.into(),
            skapp: None,
        }
    }

    /// Page load. A URL without the skapp parameters finishes the popup with an error
    pub fn load(opener: S, opener_origin: impl Into<String>, url: &Url) -> Self {
        let mut popup = Self::new(opener, opener_origin);
        match PopupParams::from_url(url) {
            Ok(params) => popup.skapp = Some(params.skapp),
            Err(error) => popup.fail(error),
        }
        popup
    }

    pub fn view(&self) -> IdentityView {
        self.view
    }

    pub fn skapp(&self) -> Option<&SkappInfo> {
        self.skapp.as_ref()
    }

    fn navigate(&mut self, view: IdentityView) {
        if self.view != IdentityView::Submitted {
            self.view = view;
        }
    }

    pub fn go_to_logged_out(&mut self) {
        self.navigate(IdentityView::LoggedOut);
    }

    pub fn go_to_sign_in(&mut self) {
        self.navigate(IdentityView::SignIn);
    }

    pub fn go_to_sign_up(&mut self) {
        self.navigate(IdentityView::SignUp);
    }

    fn ensure_view(&self, expected: IdentityView) -> Result<()> {
        if self.view != expected {
            return Err(ProviderError::Validation(format!("form not shown, current view is {:?}", self.view)));
        }
        Ok(())
    }

    fn submit(&mut self, message: PopupMessage) {
        self.opener.post_message(message.to_value(), &self.opener_origin);
        self.view = IdentityView::Submitted;
    }

    /// Returning user, the identity is resolved by the provider
    pub fn sign_in(&mut self, seed: &str) -> Result<()> {
        self.ensure_view(IdentityView::SignIn)?;
        let info = ConnectionInfo::sign_in(seed);
        info.validate()?;
        self.submit(PopupMessage::Identity(info));
        Ok(())
    }

    pub fn sign_up(&mut self, seed: &str, username: &str) -> Result<()> {
        self.ensure_view(IdentityView::SignUp)?;
        if username.is_empty() {
            return Err(ProviderError::Validation("Username not provided".to_string()));
        }
        let info = ConnectionInfo::new(seed, username);
        info.validate()?;
        self.submit(PopupMessage::Identity(info));
        Ok(())
    }

    /// Address of the permission page in the chained connector flow. The identity must be resolved
    pub fn permissions_url(&self, base: &Url, path: &str, info: &ConnectionInfo) -> Result<Url> {
        let skapp = self.skapp.as_ref().ok_or_else(|| ProviderError::Validation("Skapp info not found".to_string()))?;
        info.validate()?;
        if info.identity.is_empty() {
            return Err(ProviderError::Validation("Identity not found".to_string()));
        }
        permission_popup_url(base, path, skapp, Some(info))
    }

    /// Connector submit: instead of answering the opener, the page moves on to the permission page.
    /// A sign-in has its identity looked up first, a failed lookup is posted to the opener
    pub async fn hand_off<K, L>(
        &mut self,
        sessions: &IdentitySessionManager<K, L>,
        base: &Url,
        path: &str,
        mut info: ConnectionInfo,
    ) -> Result<Url>
    where
        K: KeyValueStore,
        L: LocalStorage,
    {
        if !matches!(self.view, IdentityView::SignIn | IdentityView::SignUp) {
            return Err(ProviderError::Validation(format!("form not shown, current view is {:?}", self.view)));
        }
        info.validate()?;

        if info.is_returning_user() {
            match sessions.fetch_identity_using_seed(&info.seed).await {
                Ok(identity) => info.identity = identity,
                Err(error) => {
                    self.fail(ErrorPayload::from(&error));
                    return Err(error);
                }
            }
        }

        let url = self.permissions_url(base, path, &info)?;
        // Navigating away, the permission page answers the opener from here on
        self.view = IdentityView::Submitted;
        Ok(url)
    }

    pub fn fail(&mut self, error: ErrorPayload) {
        if self.view != IdentityView::Submitted {
            self.submit(PopupMessage::Error(error));
        }
    }

    /// Unload. Only tells the opener when nothing was submitted
    pub fn close(&mut self) {
        if self.view != IdentityView::Submitted {
            self.submit(PopupMessage::Closed);
        }
    }
}
