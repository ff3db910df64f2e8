use std::sync::Arc;

use super::{Storage, StorageEntry};
use crate::errors::RvError;

/// A prefixed window onto a `Storage`; keys handed in and out are relative to the prefix.
#[derive(Clone)]
pub struct StorageView {
    storage: Arc<dyn Storage>,
    prefix: String,
}

impl Storage for StorageView {
    fn list(&self, prefix: &str) -> Result<Vec<String>, RvError> {
        self.sanity_check(prefix)?;
        self.storage.list(self.expand_key(prefix).as_str())
    }

    fn get(&self, key: &str) -> Result<Option<StorageEntry>, RvError> {
        self.sanity_check(key)?;
        let storage_entry = self.storage.get(self.expand_key(key).as_str())?;
        Ok(storage_entry.map(|entry| StorageEntry { key: self.truncate_key(entry.key.as_str()), value: entry.value }))
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), RvError> {
        self.sanity_check(entry.key.as_str())?;
        let nested = StorageEntry { key: self.expand_key(entry.key.as_str()), value: entry.value.clone() };
        self.storage.put(&nested)
    }

    fn delete(&self, key: &str) -> Result<(), RvError> {
        self.sanity_check(key)?;
        self.storage.delete(self.expand_key(key).as_str())
    }
}

impl StorageView {
    pub fn new(storage: Arc<dyn Storage>, prefix: &str) -> Self {
        StorageView { storage, prefix: prefix.to_string() }
    }

    pub fn new_sub_view(&self, prefix: &str) -> Self {
        StorageView { storage: Arc::clone(&self.storage), prefix: self.expand_key(prefix) }
    }

    /// Every direct key under this view, skipping nested folders.
    pub fn get_keys(&self) -> Result<Vec<String>, RvError> {
        Ok(self.list("")?.into_iter().filter(|key| !key.ends_with('/')).collect())
    }

    fn sanity_check(&self, key: &str) -> Result<(), RvError> {
        if key.contains("..") || key.starts_with('/') {
            Err(RvError::ErrStorageKeySanityCheckFailed)
        } else {
            Ok(())
        }
    }

    fn expand_key(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    fn truncate_key(&self, full: &str) -> String {
        full.strip_prefix(self.prefix.as_str()).unwrap_or(full).to_string()
    }
}
