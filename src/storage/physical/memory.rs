use std::{collections::BTreeMap, sync::RwLock};

use super::children;
use crate::{
    errors::RvError,
    storage::{Storage, StorageEntry},
};

/// Process-local storage, mostly useful for tests and for embedding without persistence.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryBackend {
    fn list(&self, prefix: &str) -> Result<Vec<String>, RvError> {
        if prefix.starts_with('/') {
            return Err(RvError::ErrPhysicalBackendPrefixInvalid);
        }

        let entries = self.entries.read()?;
        Ok(children(entries.range(prefix.to_string()..).map(|(k, _)| k).take_while(|k| k.starts_with(prefix)), prefix))
    }

    fn get(&self, key: &str) -> Result<Option<StorageEntry>, RvError> {
        if key.starts_with('/') {
            return Err(RvError::ErrPhysicalBackendKeyInvalid);
        }

        let entries = self.entries.read()?;
        Ok(entries.get(key).map(|value| StorageEntry { key: key.to_string(), value: value.clone() }))
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), RvError> {
        if entry.key.starts_with('/') || entry.key.is_empty() {
            return Err(RvError::ErrPhysicalBackendKeyInvalid);
        }

        let mut entries = self.entries.write()?;
        entries.insert(entry.key.clone(), entry.value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), RvError> {
        if key.starts_with('/') {
            return Err(RvError::ErrPhysicalBackendKeyInvalid);
        }

        let mut entries = self.entries.write()?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{
        super::super::test::{test_backend, test_backend_list_prefix},
        *,
    };

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        test_backend(&backend);
        test_backend_list_prefix(&backend);
    }
}
