//! Turns a role into a live broker user.
//!
//! Issuance holds the role's read lock from lookup to lease registration. The broker user is
//! created first, then permissions are applied vhost by vhost, then the lease is recorded; until
//! the lease exists a rollback guard owns the broker user and deletes it on any exit, including
//! unwinding.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use better_default::Default;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{
    broker::BrokerAdmin,
    lease_tracker::LeaseTracker,
    role_store::{RoleEntry, RoleStore},
};
use crate::{
    config::DEFAULT_USERNAME_ATTEMPTS,
    errors::RvError,
    utils::{deserialize_system_time, random_alphanumeric, random_hex, serialize_system_time},
};

pub const PASSWORD_LENGTH: usize = 32;
const USERNAME_SUFFIX_BYTES: usize = 8;

pub type UsernameGenerator = dyn Fn(&str) -> String + Send + Sync;

/// An issued broker credential. The password only ever lives in the value returned by
/// [`CredentialIssuer::issue`]; it is skipped by serde and wiped on drop.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    #[serde(skip)]
    pub password: Zeroizing<String>,
    pub role_name: String,
    pub lease_id: String,
    #[default(SystemTime::now())]
    #[serde(serialize_with = "serialize_system_time", deserialize_with = "deserialize_system_time")]
    pub issued_at: SystemTime,
    #[default(SystemTime::now())]
    #[serde(serialize_with = "serialize_system_time", deserialize_with = "deserialize_system_time")]
    pub expires_at: SystemTime,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role_name", &self.role_name)
            .field("lease_id", &self.lease_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Lease parameters applied to one issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOptions {
    pub ttl: Duration,
    pub max_ttl: Duration,
    pub renewable: bool,
}

/// Deletes the broker user on drop unless the issuance committed. The username reservation is
/// released either way.
struct RollbackGuard<'a> {
    broker: &'a dyn BrokerAdmin,
    leases: &'a LeaseTracker,
    username: &'a str,
    committed: bool,
}

impl RollbackGuard<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            log::warn!("rolling back broker user {}", self.username);
            if let Err(err) = self.broker.delete_user(self.username) {
                log::error!("failed to roll back broker user {}, err: {}", self.username, err);
            }
        }

        if let Err(err) = self.leases.release_username(self.username) {
            log::error!("failed to release username {}, err: {}", self.username, err);
        }
    }
}

pub struct CredentialIssuer {
    roles: Arc<RoleStore>,
    leases: Arc<LeaseTracker>,
    broker: Arc<dyn BrokerAdmin>,
    username_attempts: usize,
    username_generator: Arc<UsernameGenerator>,
}

pub fn default_username(role_name: &str) -> String {
    format!("{}-{}", role_name, random_hex(USERNAME_SUFFIX_BYTES))
}

impl CredentialIssuer {
    pub fn new(roles: Arc<RoleStore>, leases: Arc<LeaseTracker>, broker: Arc<dyn BrokerAdmin>) -> Self {
        Self {
            roles,
            leases,
            broker,
            username_attempts: DEFAULT_USERNAME_ATTEMPTS,
            username_generator: Arc::new(default_username),
        }
    }

    pub fn with_username_attempts(mut self, attempts: usize) -> Self {
        self.username_attempts = attempts.max(1);
        self
    }

    pub fn with_username_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.username_generator = Arc::new(generator);
        self
    }

    pub fn issue(&self, role_name: &str, options: &LeaseOptions) -> Result<Credential, RvError> {
        let lock_entry = self.roles.get_lock(role_name);
        let _locked = lock_entry.lock.read()?;

        let role = self.roles.get(role_name)?.ok_or(RvError::ErrRoleNotFound)?;
        let username = self.generate_username(role_name)?;
        let password = Zeroizing::new(random_alphanumeric(PASSWORD_LENGTH));

        // the guard is armed before create_user: a timed out create may still have landed
        let guard = RollbackGuard {
            broker: self.broker.as_ref(),
            leases: self.leases.as_ref(),
            username: &username,
            committed: false,
        };

        self.broker.create_user(&username, &password, &role.tags)?;
        self.apply_permissions(&username, &role)?;

        let issued_at = SystemTime::now();
        let mut credential = Credential {
            username: username.clone(),
            password,
            role_name: role.name.clone(),
            lease_id: String::new(),
            issued_at,
            expires_at: issued_at + options.ttl,
        };

        credential.lease_id = self.leases.register(&credential, options.ttl, options.max_ttl, options.renewable)?;
        guard.commit();

        log::debug!("issued broker user {} for role {}, lease_id: {}", credential.username, role.name, credential.lease_id);
        Ok(credential)
    }

    fn generate_username(&self, role_name: &str) -> Result<String, RvError> {
        for _ in 0..self.username_attempts {
            let username = (self.username_generator)(role_name);
            if self.leases.reserve_username(&username)? {
                return Ok(username);
            }
            log::debug!("generated username {} collides, retrying", username);
        }

        Err(RvError::ErrGenerationExhausted)
    }

    fn apply_permissions(&self, username: &str, role: &RoleEntry) -> Result<(), RvError> {
        for (vhost, perm) in role.vhosts.iter() {
            self.broker.set_permissions(username, vhost, &perm.configure, &perm.write, &perm.read)?;
        }

        for (vhost, exchanges) in role.vhost_topics.iter() {
            for (exchange, perm) in exchanges.iter() {
                self.broker.set_topic_permissions(username, vhost, exchange, &perm.write, &perm.read)?;
            }
        }

        Ok(())
    }
}
