use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Capability descriptor handed to a skapp once it is connected: method name to the types of its
/// signature. Fixed for a given provider version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderInterface(BTreeMap<String, Vec<String>>);

impl ProviderInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, name: &str, signature: &[&str]) -> Self {
        self.0.insert(name.to_string(), signature.iter().map(|kind| kind.to_string()).collect());
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.0.contains_key(method)
    }

    pub fn signature(&self, method: &str) -> Option<&[String]> {
        self.0.get(method).map(Vec::as_slice)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
