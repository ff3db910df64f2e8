use std::{sync::Arc, time::Duration};

use super::{RabbitMqBackend, RabbitMqBackendInner};
use crate::{
    config::LeaseConfig,
    errors::RvError,
    logical::{Operation, Path, Request, Response},
};

impl RabbitMqBackend {
    pub fn config_lease_path(&self) -> Result<Path, RvError> {
        let rabbitmq_backend_ref1 = Arc::clone(&self.inner);
        let rabbitmq_backend_ref2 = Arc::clone(&self.inner);

        let path = Path::new(
            r"config/lease",
            r#"
Configure the lease parameters for generated credentials.

Sets the ttl and max_ttl of credentials issued from now on. Zero means the
engine default; ttl values above max_ttl are capped at max_ttl.
            "#,
        )?
        .operation(Operation::Read, move |req| rabbitmq_backend_ref1.read_config_lease(req))
        .operation(Operation::Write, move |req| rabbitmq_backend_ref2.write_config_lease(req));

        Ok(path)
    }
}

impl RabbitMqBackendInner {
    pub fn read_config_lease(&self, _req: &mut Request) -> Result<Option<Response>, RvError> {
        let lease = self.get_lease_config()?.unwrap_or(LeaseConfig { ttl: Duration::ZERO, max_ttl: Duration::ZERO });
        let data = serde_json::to_value(lease)?;
        Ok(Some(Response::data_response(data.as_object().cloned())))
    }

    pub fn write_config_lease(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let lease: LeaseConfig = req.decode_body()?;

        let mut resp = None;
        if !lease.max_ttl.is_zero() && lease.ttl > lease.max_ttl {
            let mut r = Response::new();
            r.add_warning("ttl is greater than max_ttl, issued leases will use max_ttl");
            resp = Some(r);
        }

        self.set_lease_config(&lease)?;
        log::debug!("lease config written, ttl: {}s, max_ttl: {}s", lease.ttl.as_secs(), lease.max_ttl.as_secs());

        Ok(resp)
    }
}
