mod credential_store;
mod error;
mod local;
mod memory;

use p256::ecdsa::VerifyingKey;

use crate::crypto::SignedDocument;

pub trait Store
where
    Self: Sized + Send + Sync + 'static
{
    type Error: Into<StoreError> + Sized + Send + Sync + 'static;
}

/// Remote registry addressed by public key and document id. Replication and durability are the
/// implementor's business, the core only relies on last-write-wins per entry
#[async_trait::async_trait]
pub trait KeyValueStore: Store {
    async fn fetch(&self, public_key: &VerifyingKey, document_id: &str) -> Result<Option<SignedDocument>, Self::Error>;

    /// Stores the entry, refusing it when the signature does not match `public_key`
    async fn put(&self, public_key: &VerifyingKey, document_id: &str, document: SignedDocument) -> Result<(), Self::Error>;
}

pub use credential_store::CredentialStore;
pub use error::{StorageUnavailable, StoreError};
pub use local::{DisabledLocalStorage, LocalStorage, MemoryLocalStorage};
pub use memory::MemoryKeyValueStore;
