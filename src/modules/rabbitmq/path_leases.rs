use std::{sync::Arc, time::Duration};

use humantime::format_rfc3339;
use serde::Deserialize;
use serde_json::json;

use super::{RabbitMqBackend, RabbitMqBackendInner};
use crate::{
    errors::RvError,
    logical::{Operation, Path, Request, Response, SecretData},
    utils::deserialize_duration,
};

const LEASE_ID_PATTERN: &str = r"[0-9a-fA-F-]+";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewRequest {
    /// Requested extension; zero or absent means the lease's own ttl.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub increment: Duration,
}

impl RabbitMqBackend {
    pub fn leases_path(&self) -> Result<Path, RvError> {
        let rabbitmq_backend_ref1 = Arc::clone(&self.inner);
        let rabbitmq_backend_ref2 = Arc::clone(&self.inner);
        let rabbitmq_backend_ref3 = Arc::clone(&self.inner);

        let path = Path::new(
            &format!(r"leases/(?P<lease_id>{LEASE_ID_PATTERN})"),
            r#"
Inspect, renew or revoke a lease.

Renewing extends the lease by "increment" seconds, never past the max_ttl
recorded at issuance. Revoking deletes the broker user; revoking a lease
that is already gone succeeds.
            "#,
        )?
        .operation(Operation::Read, move |req| rabbitmq_backend_ref1.read_lease(req))
        .operation(Operation::Renew, move |req| rabbitmq_backend_ref2.renew_lease(req))
        .operation(Operation::Revoke, move |req| rabbitmq_backend_ref3.revoke_lease(req));

        Ok(path)
    }

    pub fn lease_list_path(&self) -> Result<Path, RvError> {
        let rabbitmq_backend_ref = Arc::clone(&self.inner);

        let path = Path::new(r"leases/?", "List the ids of active leases.")?
            .operation(Operation::List, move |req| rabbitmq_backend_ref.list_lease(req));

        Ok(path)
    }

    pub fn lease_rotate_path(&self) -> Result<Path, RvError> {
        let rabbitmq_backend_ref = Arc::clone(&self.inner);

        let path = Path::new(
            &format!(r"leases/(?P<lease_id>{LEASE_ID_PATTERN})/rotate"),
            "Replace the credential of a lease with a freshly issued one and revoke the old one.",
        )?
        .operation(Operation::Write, move |req| rabbitmq_backend_ref.rotate_lease(req));

        Ok(path)
    }
}

impl RabbitMqBackendInner {
    pub fn read_lease(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let lease_id = req.get_param("lease_id")?;

        let le = self.leases.lookup(lease_id)?;
        if le.is_none() {
            return Ok(None);
        }

        let le = le.unwrap();
        let data = json!({
            "lease_id": le.lease_id,
            "username": le.credential.username,
            "role": le.credential.role_name,
            "issue_time": format_rfc3339(le.credential.issued_at).to_string(),
            "expire_time": format_rfc3339(le.expire_time()).to_string(),
            "ttl": le.lease.ttl.as_secs(),
            "max_ttl": le.lease.max_ttl.as_secs(),
            "renewable": le.lease.renewable,
            "revoked": le.revoked,
        })
        .as_object()
        .cloned();

        Ok(Some(Response::data_response(data)))
    }

    pub fn renew_lease(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let lease_id = req.get_param("lease_id")?.to_string();
        let body: RenewRequest = req.decode_body()?;

        let le = self.leases.renew(&lease_id, body.increment)?;

        let data = json!({
            "expire_time": format_rfc3339(le.expire_time()).to_string(),
        })
        .as_object()
        .cloned();

        let mut resp = Response::data_response(data);
        resp.secret = Some(SecretData { lease: le.lease, lease_id });

        Ok(Some(resp))
    }

    pub fn revoke_lease(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let lease_id = req.get_param("lease_id")?;
        self.leases.revoke(lease_id)?;
        Ok(None)
    }

    pub fn list_lease(&self, _req: &mut Request) -> Result<Option<Response>, RvError> {
        let leases = self.leases.list_active()?;
        Ok(Some(Response::list_response(&leases)))
    }

    pub fn rotate_lease(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let lease_id = req.get_param("lease_id")?;
        let credential = self.rotate(lease_id)?;
        Ok(Some(self.credential_response(&credential)?))
    }
}
