use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;

use crate::{
    config::Config,
    modules::rabbitmq::{broker::MockBroker, RabbitMqBackend},
    storage::{self, Storage},
    utils::generate_uuid,
};

pub const TEST_DIR: &str = "rusty_rabbitmq_test";

pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A fresh directory under the system temp dir. Callers remove it when done.
pub fn test_dir(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(TEST_DIR).join(format!("{}-{}", name, generate_uuid()));
    assert!(fs::create_dir_all(&dir).is_ok());
    dir
}

/// File storage rooted at `dir`. Opening the same dir twice sees the same data.
pub fn test_file_storage_in(dir: &Path) -> Arc<dyn Storage> {
    println!("test storage init, dir: {}", dir.to_string_lossy());

    let mut conf: HashMap<String, Value> = HashMap::new();
    conf.insert("path".to_string(), Value::String(dir.to_string_lossy().into_owned()));

    let backend = storage::new_backend("file", &conf);
    assert!(backend.is_ok());

    backend.unwrap()
}

pub fn test_file_storage(name: &str) -> Arc<dyn Storage> {
    test_file_storage_in(&test_dir(name))
}

/// A backend over file storage in `dir`, driving `broker`.
pub fn new_test_backend_with(dir: &Path, broker: Arc<MockBroker>) -> RabbitMqBackend {
    init_test_logger();

    let backend = RabbitMqBackend::new(test_file_storage_in(dir), broker, &Config::default());
    assert!(backend.is_ok());

    backend.unwrap()
}

/// A backend over file storage in `dir` and a fresh in-memory broker.
pub fn new_test_backend_in(dir: &Path) -> (Arc<MockBroker>, RabbitMqBackend) {
    let broker = Arc::new(MockBroker::new());
    let backend = new_test_backend_with(dir, Arc::clone(&broker));
    (broker, backend)
}

/// A backend over file storage in a temp dir and an in-memory broker.
pub fn new_test_backend(name: &str) -> (Arc<MockBroker>, RabbitMqBackend) {
    new_test_backend_in(&test_dir(name))
}
