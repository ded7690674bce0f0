use std::sync::Arc;
use std::time::Duration;

use p256::ecdsa::{SigningKey, VerifyingKey};
use serde_json::Value;

use crate::crypto::{DocumentSigner, DocumentVerifier};
use crate::store::{KeyValueStore, StoreError};

/// JSON view over a [`KeyValueStore`] bound to one document id. Reads and writes are bounded by
/// `timeout`. Reads re-verify the entry signature, writes are signed with the caller's private key
pub struct CredentialStore<K> {
    inner: Arc<K>,
    document_id: String,
    timeout: Duration,
}

impl<K> Clone for CredentialStore<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            document_id: self.document_id.clone(),
            timeout: self.timeout,
        }
    }
}

impl<K: KeyValueStore> CredentialStore<K> {
    pub fn new(inner: Arc<K>, document_id: impl Into<String>, timeout: Duration) -> Self {
        Self { inner, document_id: document_id.into(), timeout }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub async fn get_json(&self, public_key: &VerifyingKey) -> Result<Option<Value>, StoreError> {
        let fetch = self.inner.fetch(public_key, &self.document_id);
        let entry = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => result.map_err(Into::<StoreError>::into)?,
            Err(_) => return Err(StoreError::Timeout),
        };

        let Some(entry) = entry else {
            return Ok(None);
        };
        if !public_key.verify_document(&self.document_id, &entry) {
            return Err(StoreError::InvalidSignature);
        }
        Ok(Some(entry.data))
    }

    pub async fn set_json(&self, private_key: &SigningKey, data: Value) -> Result<(), StoreError> {
        let document = private_key.sign_document(&self.document_id, data)?;
        let public_key = VerifyingKey::from(private_key);
        let put = self.inner.put(&public_key, &self.document_id, document);
        match tokio::time::timeout(self.timeout, put).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}
