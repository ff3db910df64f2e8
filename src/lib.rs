//! This crate is a RabbitMQ secrets engine built the RustyVault way.
//!
//! Operators declare roles: broker tags plus per-vhost and per-topic permission regexes. Reading
//! credentials for a role creates a short-lived user on the broker, applies the role's
//! permissions and returns the username and password under a lease. Leases can be renewed up to
//! the max_ttl fixed at issuance, rotated or revoked, and a periodic sweep revokes whatever
//! expires. Every partially created broker user is rolled back, so a failed issuance leaves
//! nothing behind on the broker.
//!
//! The engine is an explicitly constructed object:
//!
//! ```no_run
//! use rusty_rabbitmq::{config::load_config, modules::rabbitmq::RabbitMqBackend};
//!
//! # fn main() -> Result<(), rusty_rabbitmq::errors::RvError> {
//! let config = load_config("/etc/rusty_rabbitmq/config.hcl")?;
//! let backend = RabbitMqBackend::from_config(&config)?;
//! backend.start()?;
//!
//! let data = serde_json::json!({ "vhosts": r#"{"/": {"configure": "", "write": ".*", "read": ".*"}}"# });
//! backend.write("roles/app", data.as_object().cloned())?;
//! let creds = backend.read("creds/app")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod logical;
pub mod modules;
pub mod storage;
pub mod utils;

pub mod test_utils;

/// rusty_rabbitmq version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
