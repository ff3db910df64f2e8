//! Per-vhost and per-topic permission sets of a role.
//!
//! Every permission is a regular expression in broker semantics: the empty string grants nothing
//! and `.*` grants everything. A field left out of a permission object is the empty string, it
//! is not an error. Any key the shape does not know is rejected.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RvError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VhostPermission {
    #[serde(default)]
    pub configure: String,
    #[serde(default)]
    pub write: String,
    #[serde(default)]
    pub read: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicPermission {
    #[serde(default)]
    pub write: String,
    #[serde(default)]
    pub read: String,
}

/// vhost -> permission triple
pub type VhostPermissions = BTreeMap<String, VhostPermission>;
/// vhost -> exchange -> permission pair
pub type VhostTopicPermissions = BTreeMap<String, BTreeMap<String, TopicPermission>>;

/// Accepts either a JSON encoded string or an inline object. `null` and blank strings mean no
/// permissions at all.
fn decode_permission_field<T: DeserializeOwned + Default>(field: &str, value: &Value) -> Result<T, RvError> {
    let decoded = match value {
        Value::Null => return Ok(T::default()),
        Value::String(s) if s.trim().is_empty() => return Ok(T::default()),
        Value::String(s) => serde_json::from_str(s),
        Value::Object(_) => serde_json::from_value(value.clone()),
        _ => return Err(RvError::ErrValidation(format!("{field} must be a JSON object or a JSON encoded string"))),
    };

    decoded.map_err(|err| RvError::ErrValidation(format!("failed to parse {field}: {err}")))
}

pub fn parse_vhosts(value: &Value) -> Result<VhostPermissions, RvError> {
    decode_permission_field("vhosts", value)
}

pub fn parse_vhost_topics(value: &Value) -> Result<VhostTopicPermissions, RvError> {
    decode_permission_field("vhost_topics", value)
}

fn validate_pattern(location: &str, pattern: &str) -> Result<(), RvError> {
    if pattern.is_empty() {
        return Ok(());
    }

    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|err| RvError::ErrValidation(format!("{location} is not a valid regular expression: {err}")))
}

/// Checks the structure and every regular expression of a role's permission sets.
pub fn validate(vhosts: &VhostPermissions, vhost_topics: &VhostTopicPermissions) -> Result<(), RvError> {
    for (vhost, perm) in vhosts.iter() {
        if vhost.is_empty() {
            return Err(RvError::ErrValidation("vhosts contains an empty vhost name".to_string()));
        }

        validate_pattern(&format!("vhosts.{vhost}.configure"), &perm.configure)?;
        validate_pattern(&format!("vhosts.{vhost}.write"), &perm.write)?;
        validate_pattern(&format!("vhosts.{vhost}.read"), &perm.read)?;
    }

    for (vhost, exchanges) in vhost_topics.iter() {
        if vhost.is_empty() {
            return Err(RvError::ErrValidation("vhost_topics contains an empty vhost name".to_string()));
        }

        for (exchange, perm) in exchanges.iter() {
            if exchange.is_empty() {
                return Err(RvError::ErrValidation(format!("vhost_topics.{vhost} contains an empty exchange name")));
            }

            validate_pattern(&format!("vhost_topics.{vhost}.{exchange}.write"), &perm.write)?;
            validate_pattern(&format!("vhost_topics.{vhost}.{exchange}.read"), &perm.read)?;
        }
    }

    Ok(())
}
