//! The RabbitMQ secrets engine.
//!
//! Roles describe what a broker user may do; reading `creds/<role>` creates such a user on the
//! broker and hands back its password together with a lease. Leases are renewed, rotated and
//! revoked through `leases/<lease_id>`, and a background sweep revokes whatever expires.
//!
//! Everything is wired explicitly by [`RabbitMqBackend::new`]: the backend owns its role store,
//! lease tracker, issuer and scheduler, all sharing one storage handle and one broker handle.

use std::{ops::Deref, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    config::{Config, LeaseConfig},
    errors::RvError,
    logical::{LogicalBackend, Request, Response},
    storage::{self, Storage, StorageEntry, StorageView},
};

pub mod broker;
pub mod client;
pub mod issuer;
pub mod lease_tracker;
pub mod path_config_lease;
pub mod path_creds;
pub mod path_leases;
pub mod path_roles;
pub mod permission;
pub mod role_store;
pub mod scheduler;

use broker::BrokerAdmin;
use client::RabbitMqClient;
use issuer::{Credential, CredentialIssuer, LeaseOptions};
use lease_tracker::LeaseTracker;
use role_store::RoleStore;
use scheduler::{RevocationScheduler, SweepReport};

pub const CONFIG_SUB_PATH: &str = "config/";
pub const CONFIG_LEASE_KEY: &str = "lease";

static RABBITMQ_BACKEND_HELP: &str = r#"
The RabbitMQ backend dynamically generates RabbitMQ users.

After mounting this backend, configure it using the endpoints within
the "config/" path.
"#;

pub struct RabbitMqBackendInner {
    pub storage: Arc<dyn Storage>,
    pub broker: Arc<dyn BrokerAdmin>,
    pub roles: Arc<RoleStore>,
    pub leases: Arc<LeaseTracker>,
    pub issuer: CredentialIssuer,
    pub config_view: StorageView,
    pub lease_defaults: LeaseConfig,
}

pub struct RabbitMqBackend {
    pub inner: Arc<RabbitMqBackendInner>,
    logical: LogicalBackend,
    scheduler: RevocationScheduler,
}

impl Deref for RabbitMqBackend {
    type Target = RabbitMqBackendInner;

    fn deref(&self) -> &RabbitMqBackendInner {
        &self.inner
    }
}

impl RabbitMqBackend {
    /// Wires the engine over `storage` and `broker`. Persisted leases are restored before the
    /// backend is returned; the sweep is not started until [`RabbitMqBackend::start`].
    pub fn new(storage: Arc<dyn Storage>, broker: Arc<dyn BrokerAdmin>, config: &Config) -> Result<Self, RvError> {
        let leases = Arc::new(LeaseTracker::new(Arc::clone(&storage), Arc::clone(&broker))?);
        let roles = Arc::new(RoleStore::new(Arc::clone(&storage), Arc::clone(&leases)));
        let issuer = CredentialIssuer::new(Arc::clone(&roles), Arc::clone(&leases), Arc::clone(&broker))
            .with_username_attempts(config.username_attempts);

        let inner = RabbitMqBackendInner {
            config_view: StorageView::new(Arc::clone(&storage), CONFIG_SUB_PATH),
            storage,
            broker,
            roles,
            leases: Arc::clone(&leases),
            issuer,
            lease_defaults: config.lease.effective(&LeaseConfig::default()),
        };

        let mut backend = Self {
            inner: Arc::new(inner),
            logical: LogicalBackend::new(RABBITMQ_BACKEND_HELP),
            scheduler: RevocationScheduler::new(leases, config.sweep_interval),
        };
        backend.logical = backend.new_logical_backend()?;

        Ok(backend)
    }

    /// Builds storage and the management API client from a loaded config file.
    pub fn from_config(config: &Config) -> Result<Self, RvError> {
        let storage_config = config.storage_config()?;
        let storage = storage::new_backend(&storage_config.stype, &storage_config.config)?;

        let connection = config.connection.as_ref().ok_or(RvError::ErrConfigConnectionNotFound)?;
        let broker = Arc::new(RabbitMqClient::new(connection)?);

        Self::new(storage, broker, config)
    }

    fn new_logical_backend(&self) -> Result<LogicalBackend, RvError> {
        let mut backend = LogicalBackend::new(RABBITMQ_BACKEND_HELP);

        backend.add_path(self.role_list_path()?);
        backend.add_path(self.roles_path()?);
        backend.add_path(self.creds_path()?);
        backend.add_path(self.config_lease_path()?);
        backend.add_path(self.lease_list_path()?);
        backend.add_path(self.lease_rotate_path()?);
        backend.add_path(self.leases_path()?);

        Ok(backend)
    }

    pub fn help(&self) -> &str {
        &self.logical.help
    }

    pub fn handle_request(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        self.logical.handle_request(req)
    }

    pub fn read(&self, path: &str) -> Result<Option<Response>, RvError> {
        let mut req = Request::new_read_request(path);
        self.handle_request(&mut req)
    }

    pub fn write(&self, path: &str, data: Option<Map<String, Value>>) -> Result<Option<Response>, RvError> {
        let mut req = Request::new_write_request(path, data);
        self.handle_request(&mut req)
    }

    pub fn delete(&self, path: &str) -> Result<Option<Response>, RvError> {
        let mut req = Request::new_delete_request(path);
        self.handle_request(&mut req)
    }

    pub fn list(&self, path: &str) -> Result<Option<Response>, RvError> {
        let mut req = Request::new_list_request(path);
        self.handle_request(&mut req)
    }

    /// Starts the periodic revocation sweep.
    pub fn start(&self) -> Result<(), RvError> {
        self.scheduler.start()
    }

    pub fn stop(&self) -> Result<(), RvError> {
        self.scheduler.stop()
    }

    pub fn sweep(&self) -> SweepReport {
        self.scheduler.sweep()
    }

    pub fn sweep_at(&self, now: std::time::SystemTime) -> SweepReport {
        self.scheduler.sweep_at(now)
    }
}

impl RabbitMqBackendInner {
    pub fn get_lease_config(&self) -> Result<Option<LeaseConfig>, RvError> {
        match self.config_view.get(CONFIG_LEASE_KEY)? {
            Some(entry) => Ok(Some(entry.decode()?)),
            None => Ok(None),
        }
    }

    pub fn set_lease_config(&self, lease: &LeaseConfig) -> Result<(), RvError> {
        let entry = StorageEntry::new(CONFIG_LEASE_KEY, lease)?;
        self.config_view.put(&entry)
    }

    /// The lease applied to newly issued credentials: the stored `config/lease`, completed with
    /// the configured defaults.
    pub fn lease_options(&self) -> Result<LeaseOptions, RvError> {
        let stored = self.get_lease_config()?.unwrap_or(self.lease_defaults);
        let effective = stored.effective(&self.lease_defaults);
        Ok(LeaseOptions { ttl: effective.ttl, max_ttl: effective.max_ttl, renewable: true })
    }

    pub fn issue(&self, role_name: &str) -> Result<Credential, RvError> {
        let options = self.lease_options()?;
        self.issuer.issue(role_name, &options)
    }

    /// Replaces the credential behind `lease_id`: a new one is issued for the same role with the
    /// same lease terms, then the old lease is revoked. If the old lease cannot be revoked the
    /// replacement is revoked too and the error is returned.
    ///
    /// The old lease's lock is held from lookup to revocation, so concurrent rotations of one
    /// lease yield a single replacement.
    pub fn rotate(&self, lease_id: &str) -> Result<Credential, RvError> {
        let (replacement, err) = {
            let lock_entry = self.leases.lease_lock(lease_id);
            let _locked = lock_entry.lock.write()?;

            let old = self.leases.lookup(lease_id)?.ok_or(RvError::ErrLeaseNotFound)?;
            if old.revoked {
                return Err(RvError::ErrLeaseNotFound);
            }

            let options =
                LeaseOptions { ttl: old.lease.ttl, max_ttl: old.lease.max_ttl, renewable: old.lease.renewable };
            let replacement = self.issuer.issue(&old.credential.role_name, &options)?;

            match self.leases.revoke_locked(lease_id) {
                Ok(()) => {
                    log::info!("rotated lease_id: {} into {}", lease_id, replacement.lease_id);
                    return Ok(replacement);
                }
                Err(err) => (replacement, err),
            }
        };

        // the replacement may share a lock stripe with the old lease, so it is revoked unlocked
        log::error!("rotation of lease_id: {} failed, revoking replacement {}", lease_id, replacement.lease_id);
        if let Err(revoke_err) = self.leases.revoke(&replacement.lease_id) {
            log::error!("failed to revoke replacement lease_id: {}, err: {}", replacement.lease_id, revoke_err);
        }

        Err(err)
    }
}
