//! Decentralized single sign-on between skapps and a seed based identity provider.
//!
//! A skapp embeds the provider and calls it over a handshake channel ([`endpoints`]). The
//! provider ([`provider::IdentityProvider`]) restores the user's session from local storage,
//! checks the skapp's permission in the registry and only opens popups ([`popup`]) when either is
//! missing. Identity and permission records are signed with keys derived from the user's seed
//! ([`crypto`]), so only the user can write them.

pub mod config;
pub mod crypto;
pub mod data;
pub mod endpoints;
pub mod error;
pub mod messenger;
pub mod model;
pub mod popup;
pub mod provider;
pub mod service;
pub mod store;

pub use config::{ProviderConfig, ProviderMetadata};
pub use error::{ErrorKind, ErrorPayload, ProviderError, Result};
pub use model::{ConnectionInfo, ProviderInterface, SkappInfo};
pub use provider::{ConnectionState, IdentityProvider, Provider};
