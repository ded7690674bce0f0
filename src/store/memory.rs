use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use p256::ecdsa::VerifyingKey;

use crate::crypto::{public_key_hex, DocumentVerifier, SignedDocument};
use crate::store::{KeyValueStore, Store, StoreError};

#[derive(Debug, thiserror::Error)]
#[error("store offline")]
struct Offline;

/// In-process registry. Entries are keyed by (public key, document id) and the last accepted write
/// wins. Counters and fault injection make it usable as a test double for a remote store
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<(String, String), SignedDocument>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    offline: AtomicBool,
    failing_reads: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `fetch` calls served or refused
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of accepted `put` calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The next `count` reads fail with a connection error
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }

    pub fn contains(&self, public_key: &VerifyingKey, document_id: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(&(public_key_hex(public_key), document_id.to_string())))
            .unwrap_or(false)
    }

    async fn simulate_latency(&self) {
        let latency = self.latency.lock().ok().and_then(|latency| *latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_read_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| remaining.checked_sub(1))
            .is_ok()
    }
}

impl Store for MemoryKeyValueStore {
    type Error = StoreError;
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn fetch(&self, public_key: &VerifyingKey, document_id: &str) -> Result<Option<SignedDocument>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.offline.load(Ordering::SeqCst) || self.take_read_failure() {
            return Err(StoreError::ConnectionReset(Box::new(Offline)));
        }

        let entries = self.entries.read().map_err(|_| StoreError::Unknown)?;
        Ok(entries.get(&(public_key_hex(public_key), document_id.to_string())).cloned())
    }

    async fn put(&self, public_key: &VerifyingKey, document_id: &str, document: SignedDocument) -> Result<(), StoreError> {
        self.simulate_latency().await;
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionReset(Box::new(Offline)));
        }
        if !public_key.verify_document(document_id, &document) {
            return Err(StoreError::InvalidSignature);
        }

        let mut entries = self.entries.write().map_err(|_| StoreError::Unknown)?;
        entries.insert((public_key_hex(public_key), document_id.to_string()), document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;
    use serde_json::json;

    use super::*;
    use crate::crypto::DocumentSigner;

    #[tokio::test]
    async fn test_put_requires_matching_key() {
        let store = MemoryKeyValueStore::new();
        let mut rng = rand::thread_rng();
        let owner = SigningKey::random(&mut rng);
        let intruder = SigningKey::random(&mut rng);

        let forged = intruder.sign_document("sky-id", json!({ "permission": true })).unwrap();
        let result = store.put(&VerifyingKey::from(&owner), "sky-id", forged).await;
        assert!(matches!(result, Err(StoreError::InvalidSignature)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryKeyValueStore::new();
        let owner = SigningKey::random(&mut rand::thread_rng());
        let public_key = VerifyingKey::from(&owner);

        for permission in [true, false] {
            let document = owner.sign_document("sky-id", json!({ "permission": permission })).unwrap();
            store.put(&public_key, "sky-id", document).await.unwrap();
        }

        let entry = store.fetch(&public_key, "sky-id").await.unwrap().unwrap();
        assert_eq!(entry.data, json!({ "permission": false }));
        assert_eq!(store.writes(), 2);
        assert!(store.contains(&public_key, "sky-id"));
    }

    #[tokio::test]
    async fn test_failing_reads_recover() {
        let store = MemoryKeyValueStore::new();
        let public_key = VerifyingKey::from(&SigningKey::random(&mut rand::thread_rng()));
        store.fail_next_reads(1);

        assert!(store.fetch(&public_key, "sky-id").await.is_err());
        assert!(store.fetch(&public_key, "sky-id").await.unwrap().is_none());
        assert_eq!(store.reads(), 2);
    }
}
