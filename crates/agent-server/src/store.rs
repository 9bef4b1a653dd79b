//! JSON-file key/value store
//!
//! Holds the API key and the analytics snapshot across restarts. The whole
//! map is rewritten on every change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use agent_core::{AgentError, KeyValueStore, Result};

pub const DEFAULT_STORE_PATH: &str = "chat-store.json";

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                AgentError::Storage(format!("{} is not a valid store: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(storage_error(&path, &e)),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened chat store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// `CHAT_STORE_PATH` or the default file name
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("CHAT_STORE_PATH").unwrap_or_else(|_| DEFAULT_STORE_PATH.into());
        Self::open(path)
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw).map_err(|e| storage_error(&self.path, &e))
    }
}

fn storage_error(path: &Path, err: &std::io::Error) -> AgentError {
    AgentError::Storage(format!("{}: {err}", path.display()))
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
