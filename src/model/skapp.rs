use serde::{Deserialize, Serialize};

/// The application asking to connect. `domain` discriminates its permission record and is the
/// label shown to the user while asking for consent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkappInfo {
    pub name: String,
    pub domain: String,
}

impl SkappInfo {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self { name: name.into(), domain: domain.into() }
    }
}
