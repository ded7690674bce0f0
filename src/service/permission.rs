use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::{derive_child_seed, gen_key_pair_from_seed, KeyPair};
use crate::error::Result;
use crate::model::{ConnectionInfo, SkappInfo};
use crate::store::{CredentialStore, KeyValueStore, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct PermissionRecord {
    permission: bool,
}

/// Grants of skapps, one record per (seed, domain) pair. Records are addressed by a key derived
/// from the user's seed, so neither the provider nor the skapp can write one on the user's behalf
pub struct PermissionManager<K> {
    store: CredentialStore<K>,
    retries: u32,
}

impl<K> Clone for PermissionManager<K> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), retries: self.retries }
    }
}

fn skapp_key_pair(info: &ConnectionInfo, skapp: &SkappInfo) -> KeyPair {
    let child_seed = derive_child_seed(&info.seed, &skapp.domain);
    gen_key_pair_from_seed(&child_seed)
}

impl<K: KeyValueStore> PermissionManager<K> {
    /// `retries` bounds how many times a transient read failure is repeated before the permission
    /// is reported as unknown
    pub fn new(store: CredentialStore<K>, retries: u32) -> Self {
        Self { store, retries }
    }

    /// `None` means no answer: no record, a malformed one, or a store that could not be reached. It
    /// is never to be read as a denial
    pub async fn fetch_skapp_permission(&self, info: &ConnectionInfo, skapp: &SkappInfo) -> Option<bool> {
        let keys = skapp_key_pair(info, skapp);

        let mut attempt = 0;
        let data = loop {
            match self.store.get_json(&keys.public_key).await {
                Ok(data) => break data?,
                Err(error) if error.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    debug!(%error, attempt, domain = %skapp.domain, "retrying permission lookup");
                }
                Err(error) => {
                    warn!(%error, domain = %skapp.domain, "permission lookup failed, treating as unknown");
                    return None;
                }
            }
        };

        match serde_json::from_value::<PermissionRecord>(data) {
            Ok(record) => Some(record.permission),
            Err(_) => {
                warn!(domain = %skapp.domain, "malformed permission record");
                None
            }
        }
    }

    pub async fn save_skapp_permission(&self, info: &ConnectionInfo, skapp: &SkappInfo, permission: bool) -> Result<()> {
        let keys = skapp_key_pair(info, skapp);
        let record = serde_json::to_value(PermissionRecord { permission }).map_err(StoreError::from)?;
        self.store.set_json(&keys.private_key, record).await?;
        debug!(domain = %skapp.domain, permission, "saved skapp permission");
        Ok(())
    }
}
