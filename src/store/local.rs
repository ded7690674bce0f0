use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::StorageUnavailable;

/// Browser-local persistent storage. An `Err` means the facility itself is missing, an absent key
/// is `Ok(None)`
pub trait LocalStorage: Send + Sync + 'static {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageUnavailable>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageUnavailable>;
    fn remove_item(&self, key: &str) -> Result<(), StorageUnavailable>;
}

impl<T: LocalStorage> LocalStorage for Arc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageUnavailable> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageUnavailable> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageUnavailable> {
        (**self).remove_item(key)
    }
}

#[derive(Default)]
pub struct MemoryLocalStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageUnavailable> {
        let items = self.items.read().map_err(|_| StorageUnavailable)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageUnavailable> {
        let mut items = self.items.write().map_err(|_| StorageUnavailable)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageUnavailable> {
        let mut items = self.items.write().map_err(|_| StorageUnavailable)?;
        items.remove(key);
        Ok(())
    }
}

/// Storage of a browser with web storage disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledLocalStorage;

impl LocalStorage for DisabledLocalStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>, StorageUnavailable> {
        Err(StorageUnavailable)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageUnavailable> {
        Err(StorageUnavailable)
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageUnavailable> {
        Err(StorageUnavailable)
    }
}
