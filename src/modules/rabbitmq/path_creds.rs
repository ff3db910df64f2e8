use std::sync::Arc;

use serde_json::json;

use super::{issuer::Credential, role_store::ROLE_NAME_PATTERN, RabbitMqBackend, RabbitMqBackendInner};
use crate::{
    errors::RvError,
    logical::{Operation, Path, Request, Response, SecretData},
};

impl RabbitMqBackend {
    pub fn creds_path(&self) -> Result<Path, RvError> {
        let rabbitmq_backend_ref = Arc::clone(&self.inner);

        let path = Path::new(
            &format!(r"creds/(?P<name>{ROLE_NAME_PATTERN})"),
            r#"
Request RabbitMQ credentials for a certain role.

This path reads RabbitMQ credentials for a certain role. The credentials
will be generated on demand and will be automatically revoked when
the lease is up.
            "#,
        )?
        .operation(Operation::Read, move |req| rabbitmq_backend_ref.read_creds(req));

        Ok(path)
    }
}

impl RabbitMqBackendInner {
    pub fn read_creds(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let name = req.get_param("name")?;
        let credential = self.issue(name)?;
        Ok(Some(self.credential_response(&credential)?))
    }

    /// The response handing a credential to the caller. This is the only place the password
    /// leaves the engine.
    pub fn credential_response(&self, credential: &Credential) -> Result<Response, RvError> {
        let le = self.leases.lookup(&credential.lease_id)?.ok_or(RvError::ErrLeaseNotFound)?;

        let data = json!({
            "username": credential.username,
            "password": credential.password.as_str(),
        })
        .as_object()
        .cloned();

        let mut resp = Response::data_response(data);
        resp.secret = Some(SecretData { lease: le.lease, lease_id: credential.lease_id.clone() });

        Ok(resp)
    }
}
