use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{
    lease_tracker::LeaseTracker,
    permission::{self, VhostPermissions, VhostTopicPermissions},
};
use crate::{
    errors::RvError,
    storage::{Storage, StorageEntry, StorageView},
    utils::locks::{LockEntry, Locks},
};

pub const ROLE_SUB_PATH: &str = "role/";
pub const ROLE_NAME_PATTERN: &str = r"\w(([\w.-]+)?\w)?";

lazy_static! {
    static ref ROLE_NAME_RE: Regex = Regex::new(&format!("^{ROLE_NAME_PATTERN}$")).unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub name: String,
    /// Comma separated broker tags given to every user issued from this role.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub vhosts: VhostPermissions,
    #[serde(default)]
    pub vhost_topics: VhostTopicPermissions,
}

impl RoleEntry {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn validate(&self) -> Result<(), RvError> {
        if self.name.is_empty() {
            return Err(RvError::ErrValidation("role name must not be empty".to_string()));
        }

        if !ROLE_NAME_RE.is_match(&self.name) {
            return Err(RvError::ErrValidation(format!("role name {} contains invalid characters", self.name)));
        }

        permission::validate(&self.vhosts, &self.vhost_topics)
    }
}

/// Role definitions keyed by name. Deleting a role is refused while leases issued from it are
/// still live.
pub struct RoleStore {
    view: StorageView,
    locks: Locks,
    leases: Arc<LeaseTracker>,
}

impl RoleStore {
    pub fn new(storage: Arc<dyn Storage>, leases: Arc<LeaseTracker>) -> Self {
        Self { view: StorageView::new(storage, ROLE_SUB_PATH), locks: Locks::new(), leases }
    }

    /// Holding this lock for reading pins the role definition; writers take it exclusively.
    pub fn get_lock(&self, name: &str) -> Arc<LockEntry> {
        self.locks.get_lock(name)
    }

    pub fn get(&self, name: &str) -> Result<Option<RoleEntry>, RvError> {
        if !ROLE_NAME_RE.is_match(name) {
            return Ok(None);
        }

        match self.view.get(name)? {
            Some(entry) => Ok(Some(entry.decode()?)),
            None => Ok(None),
        }
    }

    /// Creates or replaces the role. Nothing is written unless the role validates.
    pub fn put(&self, role: &RoleEntry) -> Result<(), RvError> {
        role.validate()?;

        let lock_entry = self.get_lock(&role.name);
        let _locked = lock_entry.lock.write()?;

        let entry = StorageEntry::new(&role.name, role)?;
        self.view.put(&entry)?;

        log::debug!("role {} written, vhosts: {}, vhost_topics: {}", role.name, role.vhosts.len(), role.vhost_topics.len());
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), RvError> {
        let lock_entry = self.get_lock(name);
        let _locked = lock_entry.lock.write()?;

        if self.get(name)?.is_none() {
            return Err(RvError::ErrNotFound);
        }

        let active = self.leases.active_for_role(name)?;
        if !active.is_empty() {
            log::warn!("refusing to delete role {}, {} active leases", name, active.len());
            return Err(RvError::ErrRoleInUse);
        }

        self.view.delete(name)?;
        log::debug!("role {} deleted", name);
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<String>, RvError> {
        self.view.get_keys()
    }
}
