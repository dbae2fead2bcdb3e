use crate::error::WarrenError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Flat key-value backing store: one opaque document per key, whole-document
/// writes only. The medium is swappable without touching reconciliation or
/// commit code.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WarrenError>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), WarrenError>;
}

/// Creates a directory with restrictive permissions (0o700 on Unix) to prevent
/// unauthorized access to record files on multi-user systems.
fn create_private_dir_all(path: &Path) -> Result<(), WarrenError> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;
        use std::os::unix::fs::PermissionsExt;

        DirBuilder::new().recursive(true).mode(0o700).create(path)?;
        let metadata = fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(WarrenError::Validation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }
        let mut perms = metadata.permissions();
        if perms.mode() & 0o777 != 0o700 {
            perms.set_mode(0o700);
            fs::set_permissions(path, perms)?;
        }
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// One JSON document per key under a private root directory. `/` in a key
/// maps to a subdirectory.
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn open(root: &Path) -> Result<Self, WarrenError> {
        create_private_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, WarrenError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn validate_key(key: &str) -> Result<(), WarrenError> {
    let ok = !key.is_empty()
        && !key.starts_with('/')
        && !key.ends_with('/')
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '%'));
    if ok {
        Ok(())
    } else {
        Err(WarrenError::Validation(format!("invalid record key: {key}")))
    }
}

impl StorageBackend for FsBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WarrenError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(WarrenError::Io(err)),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), WarrenError> {
        let path = self.path_for(key)?;
        let dir = path
            .parent()
            .ok_or_else(|| WarrenError::Validation(format!("invalid record key: {key}")))?;
        create_private_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| WarrenError::Io(e.error))?;
        Ok(())
    }
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WarrenError> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), WarrenError> {
        validate_key(key)?;
        self.entries.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Typed load/save over a `StorageBackend`.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// `Ok(None)` is the not-found sentinel.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WarrenError> {
        match self.backend.get(key)? {
            Some(bytes) => {
                let value =
                    serde_json::from_slice(&bytes).map_err(|e| WarrenError::Decode(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), WarrenError> {
        let bytes = serde_json::to_vec(value).map_err(|e| WarrenError::Encode(e.to_string()))?;
        self.backend.put(key, &bytes)
    }

    /// Lazy creation: a missing document is synthesized with `T::default()`
    /// and persisted. Returns whether the record was created.
    pub fn load_or_create<T>(&self, key: &str) -> Result<(T, bool), WarrenError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        match self.load(key)? {
            Some(value) => Ok((value, false)),
            None => {
                let value = T::default();
                self.save(key, &value)?;
                Ok((value, true))
            }
        }
    }
}
