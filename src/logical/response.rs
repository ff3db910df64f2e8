use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{errors::RvError, logical::secret::SecretData};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub request_id: String,
    pub data: Option<Map<String, Value>>,
    pub secret: Option<SecretData>,
    // warnings allow operations to report something to the caller without failing outright.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_response(data: Option<Map<String, Value>>) -> Self {
        Self { data, ..Self::default() }
    }

    pub fn list_response(keys: &[String]) -> Self {
        let mut data = Map::new();
        data.insert("keys".to_string(), Value::Array(keys.iter().cloned().map(Value::String).collect()));
        Self::data_response(Some(data))
    }

    pub fn add_warning(&mut self, warning: &str) {
        self.warnings.push(warning.to_string());
    }

    pub fn set_request_id(&mut self, id: &str) {
        self.request_id = id.to_string()
    }

    pub fn to_json_string(&self) -> Result<String, RvError> {
        Ok(serde_json::to_string(self)?)
    }
}
