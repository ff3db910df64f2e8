//! The durable key-value store used by the role store and the lease tracker.
//!
//! `Storage` is the only contract the engine relies on. Concrete backends live in
//! [`physical`], and [`view::StorageView`] narrows a backend to a key prefix so every component
//! gets its own namespace.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RvError;

pub mod physical;
pub mod view;

pub use view::StorageView;

pub trait Storage: Send + Sync {
    /// Immediate children of `prefix`, sorted. Nested children end in `/`.
    fn list(&self, prefix: &str) -> Result<Vec<String>, RvError>;
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, RvError>;
    fn put(&self, entry: &StorageEntry) -> Result<(), RvError>;
    fn delete(&self, key: &str) -> Result<(), RvError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    pub fn new(key: &str, value: &impl Serialize) -> Result<StorageEntry, RvError> {
        let data = serde_json::to_string(value)?;

        Ok(StorageEntry { key: key.to_string(), value: data.into_bytes() })
    }

    pub fn decode<'a, T: Deserialize<'a>>(&'a self) -> Result<T, RvError> {
        Ok(serde_json::from_slice(self.value.as_slice())?)
    }
}

pub fn new_backend(t: &str, conf: &HashMap<String, Value>) -> Result<Arc<dyn Storage>, RvError> {
    match t {
        "file" => {
            let backend = physical::file::FileBackend::new(conf)?;
            Ok(Arc::new(backend))
        }
        "memory" => Ok(Arc::new(physical::memory::MemoryBackend::new())),
        _ => Err(RvError::ErrPhysicalTypeInvalid),
    }
}
