use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{
    permission,
    role_store::{RoleEntry, ROLE_NAME_PATTERN},
    RabbitMqBackend, RabbitMqBackendInner,
};
use crate::{
    errors::RvError,
    logical::{Operation, Path, Request, Response},
};

/// Body of a role write. Permission sets may be JSON encoded strings or inline objects.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: String,
    #[serde(default)]
    pub vhosts: Value,
    #[serde(default)]
    pub vhost_topics: Value,
}

/// Broker tags as a comma separated string; a list of strings is joined.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Array(items) => {
            let tags: Option<Vec<String>> = items.into_iter().map(|v| v.as_str().map(str::to_string)).collect();
            tags.map(|t| t.join(",")).ok_or_else(|| serde::de::Error::custom("tags must be a list of strings"))
        }
        _ => Err(serde::de::Error::custom("tags must be a string or a list of strings")),
    }
}

impl RabbitMqBackend {
    pub fn roles_path(&self) -> Result<Path, RvError> {
        let rabbitmq_backend_ref1 = Arc::clone(&self.inner);
        let rabbitmq_backend_ref2 = Arc::clone(&self.inner);
        let rabbitmq_backend_ref3 = Arc::clone(&self.inner);

        let path = Path::new(
            &format!(r"roles?/(?P<name>{ROLE_NAME_PATTERN})"),
            r#"
Manage the roles that can be created with this backend.

This path lets you manage the roles that can be created with this backend.
A role carries the broker tags and the per-vhost and per-topic permissions
given to every user issued from it.
            "#,
        )?
        .operation(Operation::Read, move |req| rabbitmq_backend_ref1.read_role(req))
        .operation(Operation::Write, move |req| rabbitmq_backend_ref2.write_role(req))
        .operation(Operation::Delete, move |req| rabbitmq_backend_ref3.delete_role(req));

        Ok(path)
    }

    pub fn role_list_path(&self) -> Result<Path, RvError> {
        let rabbitmq_backend_ref = Arc::clone(&self.inner);

        let path = Path::new(r"roles?/?", "List the existing roles in this backend.")?
            .operation(Operation::List, move |req| rabbitmq_backend_ref.list_role(req));

        Ok(path)
    }
}

impl RabbitMqBackendInner {
    pub fn read_role(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let name = req.get_param("name")?;

        let role = self.roles.get(name)?;
        if role.is_none() {
            return Ok(None);
        }

        let data = serde_json::to_value(role.unwrap())?;
        Ok(Some(Response::data_response(data.as_object().cloned())))
    }

    pub fn write_role(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let name = req.get_param("name")?.to_string();
        let body: RoleRequest = req.decode_body()?;

        if let Some(body_name) = body.name.as_ref() {
            if !body_name.is_empty() && *body_name != name {
                return Err(RvError::ErrValidation(format!("name {body_name} does not match the role path {name}")));
            }
        }

        let role = RoleEntry {
            name,
            tags: body.tags,
            vhosts: permission::parse_vhosts(&body.vhosts)?,
            vhost_topics: permission::parse_vhost_topics(&body.vhost_topics)?,
        };

        self.roles.put(&role)?;
        Ok(None)
    }

    pub fn delete_role(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let name = req.get_param("name")?;
        self.roles.delete(name)?;
        Ok(None)
    }

    pub fn list_role(&self, _req: &mut Request) -> Result<Option<Response>, RvError> {
        let roles = self.roles.list()?;
        Ok(Some(Response::list_response(&roles)))
    }
}
