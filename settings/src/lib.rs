//! Locally persisted settings: the service key and the person group id.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const SETTINGS_FILE: &str = "settings.json";
const MIN_KEY_LEN: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO Error: {0}")]
    IoError(String),
    #[error("Serialization Error: {0}")]
    SerializationError(String),
}

/// Keys shorter than this are treated as not configured.
pub fn is_usable_key(key: &str) -> bool {
    key.chars().count() >= MIN_KEY_LEN
}

/// Fresh identifier for a person group that has never been persisted.
pub fn generate_group_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".facewatch")
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<StoredSettings, SettingsError>;

    fn save(&self, settings: &StoredSettings) -> Result<(), SettingsError>;

    fn set_api_key(&self, key: &str) -> Result<(), SettingsError> {
        let mut settings = self.load()?;
        settings.api_key = key.to_string();
        self.save(&settings)
    }

    fn set_group_id(&self, group_id: &str) -> Result<(), SettingsError> {
        let mut settings = self.load()?;
        settings.group_id = Some(group_id.to_string());
        self.save(&settings)
    }
}

/// JSON file under the data directory. A missing file loads as defaults.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(data_dir: &Path) -> Self {
        FileSettingsStore {
            path: data_dir.join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<StoredSettings, SettingsError> {
        if !self.path.exists() {
            return Ok(StoredSettings::default());
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| SettingsError::IoError(e.to_string()))?;
        if data.trim().is_empty() {
            return Ok(StoredSettings::default());
        }
        serde_json::from_str(&data).map_err(|e| SettingsError::SerializationError(e.to_string()))
    }

    fn save(&self, settings: &StoredSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::IoError(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(settings)
            .map_err(|e| SettingsError::SerializationError(e.to_string()))?;
        std::fs::write(&self.path, data).map_err(|e| SettingsError::IoError(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// In-memory store. Clones share state, and every save is counted.
#[derive(Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<Mutex<StoredSettings>>,
    saves: Arc<AtomicUsize>,
}

impl MemorySettingsStore {
    pub fn new(settings: StoredSettings) -> Self {
        MemorySettingsStore {
            inner: Arc::new(Mutex::new(settings)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StoredSettings {
        match self.inner.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<StoredSettings, SettingsError> {
        Ok(self.snapshot())
    }

    fn save(&self, settings: &StoredSettings) -> Result<(), SettingsError> {
        match self.inner.lock() {
            Ok(mut s) => *s = settings.clone(),
            Err(poisoned) => *poisoned.into_inner() = settings.clone(),
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
