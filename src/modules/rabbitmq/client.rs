//! [`BrokerAdmin`] over the RabbitMQ management HTTP API.

use base64::Engine;
use serde_json::{json, Value};
use ureq::{Agent, AgentBuilder};
use url::Url;

use super::broker::BrokerAdmin;
use crate::{config::ConnectionConfig, errors::RvError};

pub struct RabbitMqClient {
    agent: Agent,
    base: Url,
    authorization: String,
}

impl std::fmt::Debug for RabbitMqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqClient").field("base", &self.base).field("authorization", &"<redacted>").finish()
    }
}

impl RabbitMqClient {
    pub fn new(conf: &ConnectionConfig) -> Result<Self, RvError> {
        if conf.connection_uri.is_empty() {
            return Err(RvError::ErrValidation("missing connection_uri".to_string()));
        }
        if conf.username.is_empty() {
            return Err(RvError::ErrValidation("missing username".to_string()));
        }
        if conf.password.is_empty() {
            return Err(RvError::ErrValidation("missing password".to_string()));
        }

        let base = Url::parse(&conf.connection_uri)?;
        if base.cannot_be_a_base() {
            return Err(RvError::ErrValidation(format!("connection_uri {} cannot be a base url", conf.connection_uri)));
        }

        let credentials = format!("{}:{}", conf.username, conf.password.as_str());
        let authorization = format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(credentials));

        let client = Self { agent: AgentBuilder::new().timeout(conf.timeout).build(), base, authorization };

        if conf.verify_connection {
            client.verify()?;
        }

        Ok(client)
    }

    /// Fetches the broker overview to prove the endpoint and credentials work.
    pub fn verify(&self) -> Result<(), RvError> {
        let url = self.endpoint(&["api", "overview"])?;
        self.agent.get(url.as_str()).set("Authorization", &self.authorization).call().map_err(map_ureq_error)?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RvError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RvError::ErrValidation(format!("invalid connection_uri {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn put(&self, segments: &[&str], body: Value) -> Result<(), RvError> {
        let url = self.endpoint(segments)?;
        self.agent
            .put(url.as_str())
            .set("Authorization", &self.authorization)
            .send_json(body)
            .map_err(map_ureq_error)?;
        Ok(())
    }
}

fn map_ureq_error(err: ureq::Error) -> RvError {
    match err {
        ureq::Error::Status(status, resp) => {
            let message = resp.into_string().unwrap_or_default();
            RvError::ErrBrokerRejected { status, message }
        }
        ureq::Error::Transport(transport) => RvError::ErrBrokerUnavailable(transport.to_string()),
    }
}

impl BrokerAdmin for RabbitMqClient {
    fn create_user(&self, username: &str, password: &str, tags: &str) -> Result<(), RvError> {
        self.put(&["api", "users", username], json!({ "password": password, "tags": tags }))
    }

    fn delete_user(&self, username: &str) -> Result<(), RvError> {
        let url = self.endpoint(&["api", "users", username])?;
        match self.agent.delete(url.as_str()).set("Authorization", &self.authorization).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(404, _)) => {
                log::debug!("broker user {} already gone", username);
                Ok(())
            }
            Err(err) => Err(map_ureq_error(err)),
        }
    }

    fn set_permissions(
        &self,
        username: &str,
        vhost: &str,
        configure: &str,
        write: &str,
        read: &str,
    ) -> Result<(), RvError> {
        self.put(
            &["api", "permissions", vhost, username],
            json!({ "configure": configure, "write": write, "read": read }),
        )
    }

    fn set_topic_permissions(
        &self,
        username: &str,
        vhost: &str,
        exchange: &str,
        write: &str,
        read: &str,
    ) -> Result<(), RvError> {
        self.put(
            &["api", "topic-permissions", vhost, username],
            json!({ "exchange": exchange, "write": write, "read": read }),
        )
    }
}
