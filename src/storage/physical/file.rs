use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, Read, Write},
    path::PathBuf,
    sync::Mutex,
};

use serde_json::Value;

use crate::{
    errors::RvError,
    storage::{Storage, StorageEntry},
};

/// Stores every key as `<dir>/_<name>` holding the JSON encoded entry; key segments separated
/// by `/` become directories.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Storage for FileBackend {
    fn list(&self, prefix: &str) -> Result<Vec<String>, RvError> {
        if prefix.starts_with('/') {
            return Err(RvError::ErrPhysicalBackendPrefixInvalid);
        }

        let mut path = self.path.clone();
        if !prefix.is_empty() {
            path.push(prefix);
        }

        let _lock = self.lock.lock()?;

        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = vec![];
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(key) = name.strip_prefix('_') {
                names.push(key.to_owned());
            } else if entry.file_type()?.is_dir() {
                names.push(name + "/");
            }
        }

        names.sort();
        Ok(names)
    }

    fn get(&self, k: &str) -> Result<Option<StorageEntry>, RvError> {
        let file_path = self.file_path(k)?;

        let _lock = self.lock.lock()?;

        match File::open(&file_path) {
            Ok(mut file) => {
                let mut buffer = String::new();
                file.read_to_string(&mut buffer)?;
                let entry: StorageEntry = serde_json::from_str(&buffer)?;
                Ok(Some(entry))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RvError::from(err)),
        }
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), RvError> {
        let file_path = self.file_path(&entry.key)?;

        let _lock = self.lock.lock()?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // write then rename so a reader never observes a half written entry
        let tmp_path = file_path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(serde_json::to_string(entry)?.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &file_path)?;
        Ok(())
    }

    fn delete(&self, k: &str) -> Result<(), RvError> {
        let file_path = self.file_path(k)?;

        let _lock = self.lock.lock()?;
        match fs::remove_file(&file_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RvError::from(err)),
        }
    }
}

impl FileBackend {
    pub fn new(conf: &HashMap<String, Value>) -> Result<Self, RvError> {
        let path = conf.get("path").and_then(|p| p.as_str()).ok_or(RvError::ErrPhysicalConfigItemMissing)?;
        Ok(FileBackend { path: PathBuf::from(path), lock: Mutex::new(()) })
    }

    fn file_path(&self, k: &str) -> Result<PathBuf, RvError> {
        if k.is_empty() || k.starts_with('/') || k.ends_with('/') {
            return Err(RvError::ErrPhysicalBackendKeyInvalid);
        }

        let (dir, name) = match k.rsplit_once('/') {
            Some((dir, name)) => (self.path.join(dir), name),
            None => (self.path.clone(), k),
        };

        Ok(dir.join(format!("_{name}")))
    }
}

#[cfg(test)]
mod test {
    use std::{env, fs};

    use go_defer::defer;

    use super::{
        super::super::test::{test_backend, test_backend_list_prefix},
        *,
    };

    #[test]
    fn test_file_backend() {
        let dir = env::temp_dir().join("rusty_rabbitmq_file_backend");
        let _ = fs::remove_dir_all(&dir);
        assert!(fs::create_dir(&dir).is_ok());
        defer! (
            assert!(fs::remove_dir_all(&dir).is_ok());
        );

        let mut conf: HashMap<String, Value> = HashMap::new();
        conf.insert("path".to_string(), Value::String(dir.to_string_lossy().into_owned()));

        let backend = FileBackend::new(&conf);
        assert!(backend.is_ok());
        let backend = backend.unwrap();

        test_backend(&backend);
        test_backend_list_prefix(&backend);
    }
}
