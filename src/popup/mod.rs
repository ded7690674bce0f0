//! Popup windows used to collect a seed or a consent, and the URL contract between the provider
//! and the pages it opens.

pub mod identity;
pub mod permission;

use tokio::sync::watch;
use url::Url;

use crate::error::{ErrorPayload, ProviderError, Result};
use crate::model::{ConnectionInfo, SkappInfo};

pub use identity::{IdentityPopup, IdentityView};
pub use permission::{PermissionPopup, PermissionView};

pub const SKAPP_NAME_PARAM: &str = "skappName";
pub const SKAPP_DOMAIN_PARAM: &str = "skappDomain";
pub const LOGIN_SEED_PARAM: &str = "loginSeed";
pub const LOGIN_IDENTITY_PARAM: &str = "loginIdentity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRequest {
    pub url: Url,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Dimensions of the opening window, used to center popups on it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    pub screen_left: f64,
    pub screen_top: f64,
    pub inner_width: f64,
    pub inner_height: f64,
    pub avail_width: f64,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            screen_left: 0.0,
            screen_top: 0.0,
            inner_width: 1280.0,
            inner_height: 800.0,
            avail_width: 1280.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
    pub top: i64,
    pub left: i64,
}

impl PopupFeatures {
    /// `window.open` feature string
    pub fn to_feature_string(&self) -> String {
        format!(
            "scrollbars=yes, width={}, height={}, top={}, left={}",
            self.width, self.height, self.top, self.left
        )
    }
}

impl PopupRequest {
    pub fn new(url: Url, name: impl Into<String>, width: u32, height: u32) -> Self {
        Self { url, name: name.into(), width, height }
    }

    /// Position centering the popup on the opener, corrected for the browser zoom level
    pub fn centered(&self, screen: &ScreenGeometry) -> PopupFeatures {
        let zoom = if screen.avail_width > 0.0 { screen.inner_width / screen.avail_width } else { 1.0 };
        let zoom = if zoom > 0.0 { zoom } else { 1.0 };
        let left = (screen.inner_width - self.width as f64) / 2.0 / zoom + screen.screen_left;
        let top = (screen.inner_height - self.height as f64) / 2.0 / zoom + screen.screen_top;
        PopupFeatures {
            width: (self.width as f64 / zoom) as u32,
            height: (self.height as f64 / zoom) as u32,
            top: top as i64,
            left: left as i64,
        }
    }
}

/// Reference to an opened popup, valid until the window closes
pub struct WindowHandle {
    name: String,
    closed: watch::Receiver<bool>,
}

/// Held by whatever owns the popup window. Closing, or dropping it, fires the unload signal
pub struct WindowCloser {
    closed: watch::Sender<bool>,
}

impl WindowHandle {
    pub fn new(name: impl Into<String>) -> (Self, WindowCloser) {
        let (sender, receiver) = watch::channel(false);
        (Self { name: name.into(), closed: receiver }, WindowCloser { closed: sender })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.closed.has_changed().is_err()
    }

    /// Resolves once the window is gone
    pub async fn closed(&mut self) {
        // An error means the closer was dropped together with the window
        let _ = self.closed.wait_for(|closed| *closed).await;
    }
}

impl WindowCloser {
    pub fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Opens popup windows. A browser binding wraps `window.open`, tests script the pages
pub trait PopupOpener: Send + Sync + 'static {
    fn open(&self, request: &PopupRequest) -> Result<WindowHandle>;
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|error| ProviderError::Validation(format!("invalid popup path '{path}': {error}")))
}

pub fn identity_popup_url(base: &Url, path: &str, skapp: &SkappInfo) -> Result<Url> {
    let mut url = join(base, path)?;
    url.query_pairs_mut()
        .append_pair(SKAPP_NAME_PARAM, &skapp.name)
        .append_pair(SKAPP_DOMAIN_PARAM, &skapp.domain);
    Ok(url)
}

/// `login` is only passed along by the chained connector flow, where the permission page writes
/// the record itself
pub fn permission_popup_url(base: &Url, path: &str, skapp: &SkappInfo, login: Option<&ConnectionInfo>) -> Result<Url> {
    let mut url = identity_popup_url(base, path, skapp)?;
    if let Some(login) = login {
        url.query_pairs_mut()
            .append_pair(LOGIN_SEED_PARAM, login.seed.as_str())
            .append_pair(LOGIN_IDENTITY_PARAM, &login.identity);
    }
    Ok(url)
}

/// Parameters a popup page reads from its own URL
#[derive(Debug, Clone, PartialEq)]
pub struct PopupParams {
    pub skapp: SkappInfo,
    pub login: Option<ConnectionInfo>,
}

fn required(url: &Url, name: &str) -> std::result::Result<String, ErrorPayload> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ErrorPayload::missing_parameter(name))
}

impl PopupParams {
    pub fn from_url(url: &Url) -> std::result::Result<Self, ErrorPayload> {
        let name = required(url, SKAPP_NAME_PARAM)?;
        let domain = required(url, SKAPP_DOMAIN_PARAM)?;
        Ok(Self { skapp: SkappInfo { name, domain }, login: None })
    }

    pub fn from_url_with_login(url: &Url) -> std::result::Result<Self, ErrorPayload> {
        let mut params = Self::from_url(url)?;
        let seed = required(url, LOGIN_SEED_PARAM)?;
        let identity = required(url, LOGIN_IDENTITY_PARAM)?;
        params.login = Some(ConnectionInfo::new(seed, identity));
        Ok(params)
    }
}
