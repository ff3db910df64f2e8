//! Config file options of the RabbitMQ secrets engine: the storage backend, the management API
//! connection and the lease defaults. A config path may be a single `.hcl`/`.json` file or a
//! directory whose files are merged in order.

use std::{collections::HashMap, fs, path::Path, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    errors::RvError,
    utils::{deserialize_duration, serialize_duration},
};

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_LEASE_MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_BROKER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_USERNAME_ATTEMPTS: usize = 5;

static STORAGE_TYPE_KEYWORDS: &[&str] = &["file", "memory"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "validate_storage")]
    pub storage: HashMap<String, StorageConfig>,
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(
        default = "default_sweep_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub sweep_interval: Duration,
    #[serde(default = "default_username_attempts")]
    pub username_attempts: usize,
    #[serde(default)]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub stype: String,
    #[serde(flatten)]
    pub config: HashMap<String, Value>,
}

/// Where and how to reach the broker's management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub connection_uri: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default = "default_bool_true", deserialize_with = "parse_bool_string")]
    pub verify_connection: bool,
    #[serde(
        default = "default_broker_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

/// Lease durations applied to issued credentials. Zero means "use the default": for the config
/// file that is [`DEFAULT_LEASE_TTL`] / [`DEFAULT_LEASE_MAX_TTL`], for `config/lease` it is the
/// config file's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseConfig {
    #[serde(default, serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    #[serde(default, serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub max_ttl: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_LEASE_TTL, max_ttl: DEFAULT_LEASE_MAX_TTL }
    }
}

impl LeaseConfig {
    /// Fills zero fields from `defaults`.
    pub fn with_defaults(&self, defaults: &LeaseConfig) -> LeaseConfig {
        LeaseConfig {
            ttl: if self.ttl.is_zero() { defaults.ttl } else { self.ttl },
            max_ttl: if self.max_ttl.is_zero() { defaults.max_ttl } else { self.max_ttl },
        }
    }

    /// Fills zero fields from `defaults` and clamps ttl to max_ttl.
    pub fn effective(&self, defaults: &LeaseConfig) -> LeaseConfig {
        let filled = self.with_defaults(defaults);
        LeaseConfig { ttl: filled.ttl.min(filled.max_ttl), max_ttl: filled.max_ttl }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut storage = HashMap::new();
        storage.insert("memory".to_string(), StorageConfig { stype: "memory".to_string(), config: HashMap::new() });

        Self {
            storage,
            connection: None,
            lease: LeaseConfig::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            username_attempts: DEFAULT_USERNAME_ATTEMPTS,
            log_level: String::new(),
        }
    }
}

fn default_bool_true() -> bool {
    true
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

fn default_broker_timeout() -> Duration {
    DEFAULT_BROKER_TIMEOUT
}

fn default_username_attempts() -> usize {
    DEFAULT_USERNAME_ATTEMPTS
}

fn parse_bool_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;
    match value {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(serde::de::Error::custom("Invalid value for bool")),
        },
        _ => Err(serde::de::Error::custom("Invalid value for bool")),
    }
}

fn validate_storage<'de, D>(deserializer: D) -> Result<HashMap<String, StorageConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let storage: HashMap<String, StorageConfig> = Deserialize::deserialize(deserializer)?;

    for key in storage.keys() {
        if !STORAGE_TYPE_KEYWORDS.contains(&key.as_str()) {
            return Err(serde::de::Error::custom("Invalid storage key"));
        }
    }

    Ok(storage)
}

impl Config {
    pub fn merge(&mut self, other: Config) {
        self.storage.extend(other.storage);

        if other.connection.is_some() {
            self.connection = other.connection;
        }

        if other.lease != LeaseConfig::default() {
            self.lease = other.lease;
        }

        if other.sweep_interval != DEFAULT_SWEEP_INTERVAL {
            self.sweep_interval = other.sweep_interval;
        }

        if other.username_attempts != DEFAULT_USERNAME_ATTEMPTS {
            self.username_attempts = other.username_attempts;
        }

        if !other.log_level.is_empty() {
            self.log_level = other.log_level;
        }
    }

    /// Installs `env_logger` as the global logger. A non-empty `log_level` is used as the filter
    /// directive, otherwise `RUST_LOG` applies.
    pub fn init_logger(&self) -> Result<(), RvError> {
        let mut builder = env_logger::Builder::from_default_env();
        if !self.log_level.is_empty() {
            builder.parse_filters(&self.log_level);
        }

        builder.try_init().map_err(anyhow::Error::from)?;
        Ok(())
    }

    /// The single configured storage block.
    pub fn storage_config(&self) -> Result<&StorageConfig, RvError> {
        self.storage.values().next().ok_or(RvError::ErrConfigStorageNotFound)
    }
}

pub fn load_config(path: &str) -> Result<Config, RvError> {
    let f = Path::new(path);
    if f.is_dir() {
        load_config_dir(path)
    } else if f.is_file() {
        load_config_file(path)
    } else {
        Err(RvError::ErrConfigPathInvalid)
    }
}

fn load_config_dir(dir: &str) -> Result<Config, RvError> {
    log::debug!("load_config_dir: {}", dir);
    let mut paths: Vec<String> = Vec::new();

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        if let Some(ext) = path.extension() {
            if ext == "hcl" || ext == "json" {
                paths.push(path.to_string_lossy().into_owned());
            }
        }
    }

    paths.sort();

    let mut result: Option<Config> = None;

    for path in paths {
        log::debug!("load_config_dir path: {}", path);
        let config = load_config_file(&path)?;
        match result.as_mut() {
            Some(merged) => merged.merge(config),
            None => result = Some(config),
        }
    }

    let config = result.ok_or(RvError::ErrConfigLoadFailed)?;
    check_config(&config)?;
    Ok(config)
}

fn load_config_file(path: &str) -> Result<Config, RvError> {
    log::debug!("load_config_file: {}", path);
    let file = fs::File::open(path)?;

    let mut config: Config = if path.ends_with(".hcl") {
        hcl::from_reader(file)?
    } else if path.ends_with(".json") {
        serde_json::from_reader(file)?
    } else {
        return Err(RvError::ErrConfigPathInvalid);
    };

    set_config_type_field(&mut config);
    config.lease = config.lease.with_defaults(&LeaseConfig::default());
    check_config(&config)?;
    Ok(config)
}

fn set_config_type_field(config: &mut Config) {
    config.storage.iter_mut().for_each(|(key, value)| value.stype = key.clone());
}

fn check_config(config: &Config) -> Result<(), RvError> {
    if config.storage.len() != 1 {
        return Err(RvError::ErrConfigStorageNotFound);
    }

    if config.lease.max_ttl < config.lease.ttl {
        return Err(RvError::ErrValidation("lease ttl must not exceed lease max_ttl".to_string()));
    }

    if config.username_attempts == 0 {
        return Err(RvError::ErrValidation("username_attempts must be at least 1".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::{env, fs, io::prelude::*};

    use go_defer::defer;

    use super::*;
    use crate::utils::generate_uuid;

    fn write_file(path: &Path, config: &str) -> Result<(), RvError> {
        let mut file = fs::File::create(path)?;

        file.write_all(config.as_bytes())?;

        file.flush()?;

        Ok(())
    }

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = env::temp_dir().join(format!("rusty_rabbitmq_{}_{}", name, generate_uuid()));
        assert!(fs::create_dir_all(&dir).is_ok());
        dir
    }

    #[test]
    fn test_load_config() {
        let dir = temp_dir("test_load_config");
        defer! (
            assert!(fs::remove_dir_all(&dir).is_ok());
        );

        let hcl_path = dir.join("config.hcl");
        let hcl_config_str = r#"
            storage "file" {
              path    = "./rabbitmq/data"
            }

            connection {
              connection_uri    = "http://localhost:15672"
              username          = "guest"
              password          = "guest"
              verify_connection = "false"
              timeout           = "5s"
            }

            lease {
              ttl     = "30m"
              max_ttl = 7200
            }

            sweep_interval = "10s"
            log_level = "debug"
        "#;
        assert!(write_file(&hcl_path, hcl_config_str).is_ok());

        let hcl_config = load_config(hcl_path.to_str().unwrap()).unwrap();
        let storage = hcl_config.storage_config().unwrap();
        assert_eq!(storage.stype, "file");
        assert_eq!(storage.config["path"], Value::String("./rabbitmq/data".into()));

        let conn = hcl_config.connection.as_ref().unwrap();
        assert_eq!(conn.connection_uri, "http://localhost:15672");
        assert!(!conn.verify_connection);
        assert_eq!(conn.timeout, Duration::from_secs(5));
        assert_eq!(hcl_config.lease.ttl, Duration::from_secs(1800));
        assert_eq!(hcl_config.lease.max_ttl, Duration::from_secs(7200));
        assert_eq!(hcl_config.sweep_interval, Duration::from_secs(10));
        assert_eq!(hcl_config.username_attempts, DEFAULT_USERNAME_ATTEMPTS);
        assert_eq!(hcl_config.log_level, "debug");

        let json_path = dir.join("config.json");
        let json_config_str = r#"{
            "storage": {
                "file": {
                    "path": "./rabbitmq/data"
                }
            },
            "connection": {
                "connection_uri": "http://localhost:15672",
                "username": "guest",
                "password": "guest",
                "timeout": 5
            },
            "lease": {
                "ttl": 1800,
                "max_ttl": "2h"
            },
            "sweep_interval": "10s",
            "log_level": "debug"
        }"#;
        assert!(write_file(&json_path, json_config_str).is_ok());

        let json_config = load_config(json_path.to_str().unwrap()).unwrap();
        assert_eq!(json_config.lease, hcl_config.lease);
        assert!(json_config.connection.as_ref().unwrap().verify_connection);
        assert_eq!(json_config.sweep_interval, hcl_config.sweep_interval);
    }

    #[test]
    fn test_load_config_dir() {
        let dir = temp_dir("test_load_config_dir");
        defer! (
            assert!(fs::remove_dir_all(&dir).is_ok());
        );

        let storage_str = r#"
            storage "memory" {}
        "#;
        let lease_str = r#"{
            "storage": {"memory": {}},
            "lease": {"ttl": "5m", "max_ttl": "1h"},
            "username_attempts": 3
        }"#;
        assert!(write_file(&dir.join("a.hcl"), storage_str).is_ok());
        assert!(write_file(&dir.join("b.json"), lease_str).is_ok());
        assert!(write_file(&dir.join("ignored.txt"), "garbage").is_ok());

        let config = load_config(dir.to_str().unwrap()).unwrap();
        assert_eq!(config.storage_config().unwrap().stype, "memory");
        assert_eq!(config.lease, LeaseConfig { ttl: Duration::from_secs(300), max_ttl: Duration::from_secs(3600) });
        assert_eq!(config.username_attempts, 3);
        assert!(config.connection.is_none());
    }

    #[test]
    fn test_load_config_invalid() {
        let dir = temp_dir("test_load_config_invalid");
        defer! (
            assert!(fs::remove_dir_all(&dir).is_ok());
        );

        assert_eq!(load_config(dir.join("missing.hcl").to_str().unwrap()).unwrap_err(), RvError::ErrConfigPathInvalid);
        assert_eq!(load_config(dir.to_str().unwrap()).unwrap_err(), RvError::ErrConfigLoadFailed);

        let bad_storage = dir.join("bad_storage.json");
        assert!(write_file(&bad_storage, r#"{"storage": {"mysql": {}}}"#).is_ok());
        assert!(load_config(bad_storage.to_str().unwrap()).is_err());

        let bad_lease = dir.join("bad_lease.json");
        assert!(write_file(&bad_lease, r#"{"storage": {"memory": {}}, "lease": {"ttl": "2h", "max_ttl": "1h"}}"#).is_ok());
        assert_eq!(load_config(bad_lease.to_str().unwrap()).unwrap_err(), RvError::ErrValidation(String::new()));
    }

    #[test]
    fn test_load_config_partial_lease() {
        let dir = temp_dir("test_load_config_partial_lease");
        defer! (
            assert!(fs::remove_dir_all(&dir).is_ok());
        );

        let max_only = dir.join("max_only.hcl");
        let max_only_str = r#"
            storage "memory" {}

            lease {
              max_ttl = "2h"
            }
        "#;
        assert!(write_file(&max_only, max_only_str).is_ok());
        let config = load_config(max_only.to_str().unwrap()).unwrap();
        assert_eq!(config.lease, LeaseConfig { ttl: DEFAULT_LEASE_TTL, max_ttl: Duration::from_secs(7200) });

        let ttl_only = dir.join("ttl_only.hcl");
        let ttl_only_str = r#"
            storage "memory" {}

            lease {
              ttl = "3h"
            }
        "#;
        assert!(write_file(&ttl_only, ttl_only_str).is_ok());
        let config = load_config(ttl_only.to_str().unwrap()).unwrap();
        assert_eq!(config.lease, LeaseConfig { ttl: Duration::from_secs(3 * 3600), max_ttl: DEFAULT_LEASE_MAX_TTL });

        let empty = dir.join("empty.json");
        assert!(write_file(&empty, r#"{"storage": {"memory": {}}, "lease": {}}"#).is_ok());
        let config = load_config(empty.to_str().unwrap()).unwrap();
        assert_eq!(config.lease, LeaseConfig::default());
    }

    #[test]
    fn test_init_logger() {
        let config = Config { log_level: "debug".to_string(), ..Default::default() };
        // the global logger may already be set by another test
        let _ = config.init_logger();
        assert!(matches!(config.init_logger(), Err(RvError::ErrOther(_))));
    }

    #[test]
    fn test_lease_config_effective() {
        let defaults = LeaseConfig::default();
        let zero = LeaseConfig { ttl: Duration::ZERO, max_ttl: Duration::ZERO };
        assert_eq!(zero.effective(&defaults), defaults);

        let long_ttl = LeaseConfig { ttl: Duration::from_secs(600), max_ttl: Duration::from_secs(60) };
        assert_eq!(long_ttl.effective(&defaults).ttl, Duration::from_secs(60));

        let only_ttl = LeaseConfig { ttl: Duration::from_secs(600), max_ttl: Duration::ZERO };
        assert_eq!(only_ttl.effective(&defaults), LeaseConfig { ttl: Duration::from_secs(600), max_ttl: DEFAULT_LEASE_MAX_TTL });
    }
}
