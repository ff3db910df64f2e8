use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{broker::BrokerAdmin, issuer::Credential};
use crate::{
    errors::RvError,
    logical::Lease,
    storage::{Storage, StorageEntry, StorageView},
    utils::{
        generate_uuid,
        locks::{LockEntry, Locks},
    },
};

pub const LEASE_SUB_PATH: &str = "lease/";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseEntry {
    pub lease_id: String,
    /// Never carries the password.
    pub credential: Credential,
    pub lease: Lease,
    /// Set once revocation has started; the record is removed when the broker user is gone.
    #[serde(default)]
    pub revoked: bool,
}

impl LeaseEntry {
    pub fn expire_time(&self) -> SystemTime {
        self.credential.expires_at
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.revoked || self.credential.expires_at <= now
    }

    fn priority(&self) -> Result<u64, RvError> {
        if self.revoked {
            return Ok(0);
        }
        Ok(self.expire_time().duration_since(UNIX_EPOCH)?.as_secs())
    }
}

/// Owns every lease record. Mutations of one lease are serialized through its keyed lock; the
/// in-memory index mirrors storage and the queue orders leases by expiry for the sweeper.
pub struct LeaseTracker {
    view: StorageView,
    broker: Arc<dyn BrokerAdmin>,
    locks: Locks,
    index: RwLock<HashMap<String, LeaseEntry>>,
    queue: RwLock<PriorityQueue<String, Reverse<u64>>>,
    reserved: Mutex<HashSet<String>>,
}

impl LeaseTracker {
    /// Builds the tracker and restores every persisted lease.
    pub fn new(storage: Arc<dyn Storage>, broker: Arc<dyn BrokerAdmin>) -> Result<Self, RvError> {
        let tracker = Self {
            view: StorageView::new(storage, LEASE_SUB_PATH),
            broker,
            locks: Locks::new(),
            index: RwLock::new(HashMap::new()),
            queue: RwLock::new(PriorityQueue::new()),
            reserved: Mutex::new(HashSet::new()),
        };

        tracker.restore()?;
        Ok(tracker)
    }

    pub fn restore(&self) -> Result<(), RvError> {
        let existing = self.view.get_keys()?;

        for lease_id in existing {
            let le = self.load_lease_entry(&lease_id)?;
            if le.is_none() {
                continue;
            }

            self.index_lease_entry(le.unwrap())?;
        }

        log::debug!("restored {} leases", self.index.read()?.len());
        Ok(())
    }

    pub fn register(
        &self,
        credential: &Credential,
        ttl: Duration,
        max_ttl: Duration,
        renewable: bool,
    ) -> Result<String, RvError> {
        if ttl > max_ttl {
            return Err(RvError::ErrLeaseTtlExceedsMax);
        }

        let lease_id = generate_uuid();

        let mut credential = credential.clone();
        credential.password = Zeroizing::new(String::new());
        credential.lease_id = lease_id.clone();

        let mut lease = Lease::new(ttl, max_ttl, renewable);
        lease.issue_time = credential.issued_at;

        // the id is fresh and unknown to anyone else until indexed, so no lease lock is taken
        let le = LeaseEntry { lease_id: lease_id.clone(), credential, lease, revoked: false };

        self.persist_lease_entry(&le)?;
        self.index_lease_entry(le)?;

        log::debug!("registered lease_id: {}", lease_id);
        Ok(lease_id)
    }

    pub fn lookup(&self, lease_id: &str) -> Result<Option<LeaseEntry>, RvError> {
        Ok(self.index.read()?.get(lease_id).cloned())
    }

    /// The keyed lock serializing every mutation of `lease_id`.
    pub fn lease_lock(&self, lease_id: &str) -> Arc<LockEntry> {
        self.locks.get_lock(lease_id)
    }

    /// Extends the lease by `requested`, or by its own ttl when `requested` is zero. The new
    /// expiry never passes `issue_time + max_ttl` and never moves before the current one.
    pub fn renew(&self, lease_id: &str, requested: Duration) -> Result<LeaseEntry, RvError> {
        let lock_entry = self.locks.get_lock(lease_id);
        let _locked = lock_entry.lock.write()?;

        let mut le = self.lookup(lease_id)?.ok_or(RvError::ErrLeaseNotFound)?;

        let now = SystemTime::now();
        if !le.lease.renewable() || le.is_expired(now) {
            return Err(RvError::ErrLeaseNotRenewable);
        }

        if requested > le.lease.max_ttl {
            return Err(RvError::ErrLeaseTtlExceedsMax);
        }

        let increment = if requested.is_zero() { le.lease.ttl() } else { requested };
        let expire_time = std::cmp::min(now + increment, le.lease.max_expiration_time());
        let expire_time = std::cmp::max(expire_time, le.credential.expires_at);

        le.credential.expires_at = expire_time;
        self.persist_lease_entry(&le)?;
        self.index_lease_entry(le.clone())?;

        log::debug!("renewed lease_id: {}, increment: {}s", lease_id, increment.as_secs());
        Ok(le)
    }

    /// Deletes the broker user and then the record. Revoking an unknown lease succeeds without
    /// touching the broker, so retries are harmless.
    pub fn revoke(&self, lease_id: &str) -> Result<(), RvError> {
        let lock_entry = self.locks.get_lock(lease_id);
        let _locked = lock_entry.lock.write()?;

        self.revoke_locked(lease_id)
    }

    /// [`LeaseTracker::revoke`] for a caller already holding the write side of
    /// [`LeaseTracker::lease_lock`].
    pub fn revoke_locked(&self, lease_id: &str) -> Result<(), RvError> {
        let le = self.lookup(lease_id)?;
        if le.is_none() {
            return Ok(());
        }

        let mut le = le.unwrap();

        log::debug!("revoke lease_id: {}", &le.lease_id);

        if !le.revoked {
            le.revoked = true;
            self.persist_lease_entry(&le)?;
            self.index_lease_entry(le.clone())?;
        }

        self.broker.delete_user(&le.credential.username)?;

        self.delete_lease_entry(lease_id)?;
        self.index.write()?.remove(lease_id);
        self.queue.write()?.remove(lease_id);

        log::info!("revoked lease_id: {}, username: {}", lease_id, le.credential.username);
        Ok(())
    }

    /// Ids of leases not yet revoked, sorted.
    pub fn list_active(&self) -> Result<Vec<String>, RvError> {
        let index = self.index.read()?;
        let mut ids: Vec<String> = index.values().filter(|le| !le.revoked).map(|le| le.lease_id.clone()).collect();
        ids.sort();
        Ok(ids)
    }

    pub fn active_for_role(&self, role_name: &str) -> Result<Vec<String>, RvError> {
        let index = self.index.read()?;
        let mut ids: Vec<String> = index
            .values()
            .filter(|le| !le.revoked && le.credential.role_name == role_name)
            .map(|le| le.lease_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Claims `username` for an issuance in flight. Fails if a lease or another issuance holds it.
    pub fn reserve_username(&self, username: &str) -> Result<bool, RvError> {
        let mut reserved = self.reserved.lock()?;
        if reserved.contains(username) {
            return Ok(false);
        }

        let in_use = self.index.read()?.values().any(|le| le.credential.username == username);
        if in_use {
            return Ok(false);
        }

        reserved.insert(username.to_string());
        Ok(true)
    }

    pub fn release_username(&self, username: &str) -> Result<(), RvError> {
        self.reserved.lock()?.remove(username);
        Ok(())
    }

    /// Leases due for revocation at `now`, earliest expiry first. Revoked leases whose broker
    /// user could not be deleted are always due.
    pub fn expired(&self, now: SystemTime) -> Result<Vec<String>, RvError> {
        let now_secs = now.duration_since(UNIX_EPOCH)?.as_secs();

        let candidates: Vec<String> = {
            let queue = self.queue.read()?;
            queue.iter().filter(|(_, Reverse(priority))| *priority <= now_secs).map(|(id, _)| id.clone()).collect()
        };

        let index = self.index.read()?;
        let mut due: Vec<&LeaseEntry> =
            candidates.iter().filter_map(|id| index.get(id)).filter(|le| le.is_expired(now)).collect();
        due.sort_by(|a, b| (a.priority().unwrap_or(0), &a.lease_id).cmp(&(b.priority().unwrap_or(0), &b.lease_id)));

        Ok(due.into_iter().map(|le| le.lease_id.clone()).collect())
    }

    fn index_lease_entry(&self, le: LeaseEntry) -> Result<(), RvError> {
        let priority = le.priority()?;
        let lease_id = le.lease_id.clone();

        self.index.write()?.insert(lease_id.clone(), le);
        let mut queue_locked = self.queue.write()?;
        queue_locked.push(lease_id, Reverse(priority));
        Ok(())
    }

    fn load_lease_entry(&self, lease_id: &str) -> Result<Option<LeaseEntry>, RvError> {
        let raw = self.view.get(lease_id)?;
        if raw.is_none() {
            return Ok(None);
        }

        match raw.unwrap().decode::<LeaseEntry>() {
            Ok(le) => Ok(Some(le)),
            Err(err) => {
                log::error!("skipping unreadable lease record {}, err: {}", lease_id, err);
                Ok(None)
            }
        }
    }

    fn persist_lease_entry(&self, le: &LeaseEntry) -> Result<(), RvError> {
        let entry = StorageEntry::new(&le.lease_id, le)?;
        self.view.put(&entry)
    }

    fn delete_lease_entry(&self, lease_id: &str) -> Result<(), RvError> {
        self.view.delete(lease_id)
    }
}
