use serde::{Deserialize, Serialize};

use crate::crypto::Seed;
use crate::error::{ProviderError, Result};

/// Session of the current user. An empty `identity` means the user signed in with an existing seed
/// and the username still has to be looked up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub seed: Seed,
    #[serde(default)]
    pub identity: String,
}

impl ConnectionInfo {
    pub fn new(seed: impl Into<Seed>, identity: impl Into<String>) -> Self {
        Self { seed: seed.into(), identity: identity.into() }
    }

    /// Connection info for a returning user, identity resolved later from the credential store
    pub fn sign_in(seed: impl Into<Seed>) -> Self {
        Self::new(seed, "")
    }

    pub fn is_returning_user(&self) -> bool {
        self.identity.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.seed.is_empty() {
            return Err(ProviderError::Validation("No seed returned".to_string()));
        }
        Ok(())
    }
}
