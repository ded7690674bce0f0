use p256::ecdsa::Signature;
use serde::{Deserialize, Serialize};
use signature::{Signer, Verifier};

/// A registry entry, the document plus the signature of whoever holds the addressing key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedDocument<T = serde_json::Value> {
    pub data: T,
    signature: Signature,
}

impl<T> SignedDocument<T> {
    pub fn new(data: T, signature: Signature) -> Self {
        Self { data, signature }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// Bytes covered by the signature. The document id is part of them so an entry can not be replayed
/// under another document of the same key
fn signing_bytes<T: Serialize>(document_id: &str, data: &T) -> serde_json::Result<Vec<u8>> {
    let data = serde_json::to_vec(data)?;
    Ok([document_id.as_bytes(), &[0u8], data.as_slice()].concat())
}

pub trait DocumentSigner: Signer<Signature> {
    fn sign_document<T: Serialize>(&self, document_id: &str, data: T) -> serde_json::Result<SignedDocument<T>> {
        let bytes = signing_bytes(document_id, &data)?;
        let signature = Signer::sign(self, bytes.as_slice());
        Ok(SignedDocument::new(data, signature))
    }
}

pub trait DocumentVerifier: Verifier<Signature> {
    fn verify_document<T: Serialize>(&self, document_id: &str, document: &SignedDocument<T>) -> bool {
        match signing_bytes(document_id, &document.data) {
            Ok(bytes) => Verifier::verify(self, bytes.as_slice(), &document.signature).is_ok(),
            Err(_) => false,
        }
    }
}

impl<S: Signer<Signature>> DocumentSigner for S {}

impl<V: Verifier<Signature>> DocumentVerifier for V {}
