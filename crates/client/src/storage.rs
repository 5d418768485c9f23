//! Persistent key/value storage for client state.
//!
//! Values are stored as JSON files in a directory, by default the
//! platform-appropriate config directory:
//!   - Linux: `~/.config/awachat/`
//!   - macOS: `~/Library/Application Support/awachat/`
//!   - Windows: `%APPDATA%\awachat\`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

const APP_DIR: &str = "awachat";

/// A directory of JSON values addressed by key.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage under the platform config directory, if one exists.
    pub fn default_location() -> Option<Self> {
        Some(Self::new(dirs::config_dir()?.join(APP_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save a value to persistent storage.
    ///
    /// Returns `true` if the operation succeeded.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.save_raw(key, &json),
            Err(_) => false,
        }
    }

    /// Load a value from persistent storage.
    ///
    /// Returns `None` if the key doesn't exist or deserialization fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.load_raw(key)?;
        serde_json::from_str(&json).ok()
    }

    /// Remove a value from persistent storage.
    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }

    /// Check if a key exists in storage.
    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).is_file()
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.root.join(format!("{}.json", safe_key))
    }

    fn save_raw(&self, key: &str, value: &str) -> bool {
        if !self.root.exists() && std::fs::create_dir_all(&self.root).is_err() {
            return false;
        }
        std::fs::write(self.file_path(key), value).is_ok()
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }
}
