// Local key/value storage for the two persisted flags
//
// Hosts normally back this with page-local storage. `FileStore` keeps a small
// JSON map on disk for standalone use; `MemoryStore` is the fallback when no
// persistence is available.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::{MicError, Result};

#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| MicError::Storage("memory store lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| MicError::Storage("memory store lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON object on disk, rewritten on every `set`
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Default location under the platform's local data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("voicehub-mic").join("storage.json"))
    }

    /// Open (or start) a store at `path`. An unreadable file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<HashMap<String, String>>(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring corrupt storage file {}: {}", path.display(), e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };
        info!("Local storage at {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| MicError::Storage("file store lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| MicError::Storage("file store lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*values)?;
        std::fs::write(&self.path, json)
            .map_err(|e| MicError::Storage(format!("write {}: {}", self.path.display(), e)))
    }
}
