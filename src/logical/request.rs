use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::Operation;
use crate::errors::RvError;

#[derive(Debug, Clone)]
pub struct Request {
    pub id: String,
    pub operation: Operation,
    pub path: String,
    /// Named captures of the matched path pattern, filled in by the router.
    pub params: HashMap<String, String>,
    pub body: Option<Map<String, Value>>,
}

impl Request {
    pub fn new(path: &str) -> Self {
        Self {
            id: String::new(),
            operation: Operation::Read,
            path: path.to_string(),
            params: HashMap::new(),
            body: None,
        }
    }

    pub fn new_read_request(path: &str) -> Self {
        Self::new(path)
    }

    pub fn new_list_request(path: &str) -> Self {
        Self { operation: Operation::List, ..Self::new(path) }
    }

    pub fn new_write_request(path: &str, body: Option<Map<String, Value>>) -> Self {
        Self { operation: Operation::Write, body, ..Self::new(path) }
    }

    pub fn new_delete_request(path: &str) -> Self {
        Self { operation: Operation::Delete, ..Self::new(path) }
    }

    pub fn new_renew_request(path: &str, body: Option<Map<String, Value>>) -> Self {
        Self { operation: Operation::Renew, body, ..Self::new(path) }
    }

    pub fn new_revoke_request(path: &str) -> Self {
        Self { operation: Operation::Revoke, ..Self::new(path) }
    }

    pub fn get_param(&self, key: &str) -> Result<&str, RvError> {
        self.params.get(key).map(String::as_str).ok_or_else(|| RvError::ErrRequestFieldInvalid(format!("{key} is missing")))
    }

    /// Decodes the body into the typed request of an operation. A missing body decodes like `{}`,
    /// fields the target does not know are rejected.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, RvError> {
        let body = Value::Object(self.body.clone().unwrap_or_default());
        serde_json::from_value(body).map_err(|err| {
            let msg = err.to_string();
            if msg.starts_with("unknown field") {
                RvError::ErrRequestFieldUnknown(msg)
            } else {
                RvError::ErrRequestFieldInvalid(msg)
            }
        })
    }
}
