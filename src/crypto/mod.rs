pub mod seed;
pub mod token;

pub use seed::{derive_child_seed, gen_key_pair_from_seed, public_key_hex, KeyPair, Seed};
pub use token::{DocumentSigner, DocumentVerifier, SignedDocument};
