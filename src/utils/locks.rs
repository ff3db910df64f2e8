//! A fixed table of `RwLock`s addressed by key.
//!
//! Role names and lease ids are hashed with blake2b onto one of `LOCK_COUNT` stripes, so every
//! operation on the same key is serialized while unrelated keys mostly proceed in parallel.

use std::sync::{Arc, RwLock};

use blake2b_simd::Params;

static LOCK_COUNT: usize = 256;

#[derive(Debug)]
pub struct LockEntry {
    pub lock: RwLock<u8>,
}

#[derive(Debug)]
pub struct Locks {
    pub locks: Vec<Arc<LockEntry>>,
}

pub fn blake2b256_hash(key: &str) -> Vec<u8> {
    let hash = Params::new().hash_length(32).to_state().update(key.as_bytes()).finalize();
    hash.as_bytes().to_vec()
}

impl Default for Locks {
    fn default() -> Self {
        Self::new()
    }
}

impl Locks {
    pub fn new() -> Self {
        let mut locks = Self { locks: Vec::with_capacity(LOCK_COUNT) };

        for _ in 0..LOCK_COUNT {
            locks.locks.push(Arc::new(LockEntry { lock: RwLock::new(0) }));
        }

        locks
    }

    pub fn get_lock(&self, key: &str) -> Arc<LockEntry> {
        let index = blake2b256_hash(key).first().map(|b| usize::from(*b)).unwrap_or(0) % self.locks.len();
        Arc::clone(&self.locks[index])
    }
}
