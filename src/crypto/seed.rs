use std::fmt;

use digest::Digest;
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_PAIR_DOMAIN: &[u8] = b"skyid/key-pair";
const CHILD_SEED_DOMAIN: &[u8] = b"skyid/child-seed";

/// Root secret of a user. Everything the user owns in the credential store is addressed by keys
/// derived from it
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(String);

impl Seed {
    pub fn new(seed: impl Into<String>) -> Self {
        Self(seed.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

impl From<&str> for Seed {
    fn from(seed: &str) -> Self {
        Self::new(seed)
    }
}

impl From<String> for Seed {
    fn from(seed: String) -> Self {
        Self::new(seed)
    }
}

pub struct KeyPair {
    pub private_key: SigningKey,
    pub public_key: VerifyingKey,
}

/// Deterministically maps a seed to a P-256 key pair, the same seed always yields the same pair
pub fn gen_key_pair_from_seed(seed: &Seed) -> KeyPair {
    let mut counter = 0u32;
    let private_key = loop {
        let hash = Sha256::new()
            .chain_update(KEY_PAIR_DOMAIN)
            .chain_update(seed.as_bytes())
            .chain_update(counter.to_be_bytes())
            .finalize();
        // Only fails for a zero scalar or one above the curve order
        if let Ok(key) = SigningKey::from_slice(hash.as_slice()) {
            break key;
        }
        counter = counter.wrapping_add(1);
    };
    let public_key = VerifyingKey::from(&private_key);

    KeyPair { private_key, public_key }
}

/// Derives the seed scoping the user's material to a single relying party
pub fn derive_child_seed(seed: &Seed, label: &str) -> Seed {
    let hash = Sha256::new()
        .chain_update(CHILD_SEED_DOMAIN)
        .chain_update((seed.as_bytes().len() as u64).to_be_bytes())
        .chain_update(seed.as_bytes())
        .chain_update(label.as_bytes())
        .finalize();
    Seed(hex::encode(hash))
}

/// Registry address of a public key, hex of its compressed SEC1 encoding
pub fn public_key_hex(public_key: &VerifyingKey) -> String {
    hex::encode(public_key.to_encoded_point(true).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_is_deterministic() {
        let seed = Seed::from("alice-seed");
        let first = gen_key_pair_from_seed(&seed);
        let second = gen_key_pair_from_seed(&seed);
        assert_eq!(first.public_key, second.public_key);
        assert_eq!(first.private_key.to_bytes(), second.private_key.to_bytes());
    }

    #[test]
    fn test_different_seeds_different_keys() {
        let alice = gen_key_pair_from_seed(&Seed::from("alice-seed"));
        let bob = gen_key_pair_from_seed(&Seed::from("bob-seed"));
        assert_ne!(alice.public_key, bob.public_key);
    }

    #[test]
    fn test_child_seed_scoped_by_label() {
        let seed = Seed::from("alice-seed");
        let app = derive_child_seed(&seed, "example.app");
        assert_eq!(app, derive_child_seed(&seed, "example.app"));
        assert_ne!(app, derive_child_seed(&seed, "other.app"));
        assert_ne!(app, seed);
        assert_eq!(app.as_str().len(), 64);
    }

    #[test]
    fn test_child_seed_not_ambiguous_on_concatenation() {
        let left = derive_child_seed(&Seed::from("ab"), "c");
        let right = derive_child_seed(&Seed::from("a"), "bc");
        assert_ne!(left, right);
    }

    #[test]
    fn test_debug_redacts_seed() {
        let seed = Seed::from("alice-seed");
        assert!(!format!("{seed:?}").contains("alice"));
    }

    #[test]
    fn test_public_key_hex_is_compressed() {
        let pair = gen_key_pair_from_seed(&Seed::from("alice-seed"));
        let encoded = public_key_hex(&pair.public_key);
        assert_eq!(encoded.len(), 66);
        assert!(encoded.starts_with("02") || encoded.starts_with("03"));
    }
}
