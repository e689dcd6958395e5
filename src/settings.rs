//! Persistent user preferences
//!
//! A flat key/value store with slash-separated keys (`core/languages`). The pipeline
//! reads the preferred subtitle language from it and [`crate::SubtitleDownloader::set_language`]
//! writes it back. The encoding preference is kept here for consumers that re-encode placed
//! subtitles.

use crate::error::{Error, Result};
use crate::utils::write_atomically;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Preferred subtitle languages, a list of provider language ids (first one wins)
pub const LANGUAGES: &str = "core/languages";
/// Preferred text encoding for placed subtitles, an encoding label such as `utf-8`
pub const ENCODING: &str = "core/encoding";

/// Key/value settings store
pub trait SettingsStore: Send + Sync {
    /// Value stored under `key`
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Preferred language from `core/languages`
///
/// Accepts either a list (first non-empty entry) or a single string.
pub fn preferred_language(store: &dyn SettingsStore) -> Option<String> {
    match store.get(LANGUAGES)? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .find(|s| !s.trim().is_empty()),
        _ => None,
    }
}

/// Preferred encoding from `core/encoding`, if set and non-empty
pub fn preferred_encoding(store: &dyn SettingsStore) -> Option<String> {
    store
        .get(ENCODING)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Settings kept in memory only
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<Map<String, Value>>,
}

impl MemorySettings {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Settings persisted as a flat JSON object
///
/// Every `set` rewrites the whole file atomically.
#[derive(Debug)]
pub struct JsonSettings {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl JsonSettings {
    /// Open the settings file at `path`; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content)? {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::Config {
                        message: format!("settings file '{}' is not a JSON object", path.display()),
                        key: None,
                    });
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read settings file '{}': {}", path.display(), e),
                )));
            }
        };
        tracing::debug!(path = ?path, keys = values.len(), "Settings loaded");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// File the settings are persisted to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        let previous = values.insert(key.to_string(), value);

        let serialized = serde_json::to_vec_pretty(&*values)?;
        if let Err(e) = write_atomically(&self.path, &serialized) {
            // Keep memory and disk in agreement
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            tracing::warn!(key, error = %e, "Failed to persist setting");
            return Err(e);
        }
        Ok(())
    }
}
