use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::{gen_key_pair_from_seed, Seed};
use crate::error::{ProviderError, Result};
use crate::model::ConnectionInfo;
use crate::store::{CredentialStore, KeyValueStore, LocalStorage};

/// Document stored under the public key of the root seed
#[derive(Debug, Serialize, Deserialize)]
struct IdentityRecord {
    identity: String,
}

/// Owns the connection of the current user: the seed kept in local storage and the identity bound
/// to it in the credential store
pub struct IdentitySessionManager<K, L> {
    store: CredentialStore<K>,
    local: L,
    login_key: String,
    current: RwLock<Option<ConnectionInfo>>,
}

impl<K: KeyValueStore, L: LocalStorage> IdentitySessionManager<K, L> {
    pub fn new(store: CredentialStore<K>, local: L, login_key: impl Into<String>) -> Self {
        Self {
            store,
            local,
            login_key: login_key.into(),
            current: RwLock::new(None),
        }
    }

    /// Connection info of the in-memory session, if any
    pub fn current(&self) -> Option<ConnectionInfo> {
        self.current.read().ok().and_then(|current| current.clone())
    }

    fn set_current(&self, info: Option<ConnectionInfo>) {
        if let Ok(mut current) = self.current.write() {
            *current = info;
        }
    }

    /// Restores the session from local storage. No seed stored means no session, and no network
    /// call is made for it
    pub async fn fetch_connection_info(&self) -> Result<Option<ConnectionInfo>> {
        let seed = match self.local.get_item(&self.login_key) {
            Ok(Some(seed)) if !seed.is_empty() => Seed::new(seed),
            Ok(_) => return Ok(None),
            Err(error) => {
                warn!(%error, "local storage disabled, using in-memory session only");
                return Ok(self.current());
            }
        };

        let identity = self.fetch_identity_using_seed(&seed).await?;
        let info = ConnectionInfo { seed, identity };
        self.set_current(Some(info.clone()));
        Ok(Some(info))
    }

    /// Saves the seed and identity for the user. An empty identity means the user signed in, in
    /// which case it is looked up instead of written
    pub async fn save_connection_info(&self, mut info: ConnectionInfo) -> Result<ConnectionInfo> {
        info.validate()?;

        if info.is_returning_user() {
            info.identity = self.fetch_identity_using_seed(&info.seed).await?;
            debug!(identity = %info.identity, "resolved identity of returning user");
        } else {
            self.save_identity_using_seed(&info.identity, &info.seed).await?;
            info!(identity = %info.identity, "registered new identity");
        }

        if let Err(error) = self.local.set_item(&self.login_key, info.seed.as_str()) {
            warn!(%error, "local storage disabled, session will not survive a reload");
        }

        self.set_current(Some(info.clone()));
        Ok(info)
    }

    /// Forgets the seed on this device. The identity record stays in the credential store
    pub fn clear_connection_info(&self) {
        self.set_current(None);
        if let Err(error) = self.local.remove_item(&self.login_key) {
            warn!(%error, "local storage disabled, nothing to clear");
        }
    }

    /// Timeouts and fetch errors are treated as a missing identity
    pub async fn fetch_identity_using_seed(&self, seed: &Seed) -> Result<String> {
        let keys = gen_key_pair_from_seed(seed);
        let data = match self.store.get_json(&keys.public_key).await {
            Ok(Some(data)) => data,
            Ok(None) => return Err(ProviderError::IdentityNotFound),
            Err(error) => {
                warn!(%error, "identity lookup failed");
                return Err(ProviderError::IdentityNotFound);
            }
        };

        match serde_json::from_value::<IdentityRecord>(data) {
            Ok(record) => Ok(record.identity),
            Err(_) => Err(ProviderError::IdentityNotFound),
        }
    }

    async fn save_identity_using_seed(&self, identity: &str, seed: &Seed) -> Result<()> {
        let keys = gen_key_pair_from_seed(seed);
        let record = serde_json::to_value(IdentityRecord { identity: identity.to_string() })
            .map_err(crate::store::StoreError::from)?;
        self.store.set_json(&keys.private_key, record).await?;
        Ok(())
    }
}
