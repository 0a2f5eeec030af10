use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::errors::CoreError;

/// One timestamped record inside a persisted cache file.
///
/// `fetched_at` is always set when `value` is set; absence of an entry means
/// "never fetched", not "fetched and empty".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_date: Option<NaiveDate>,
}

/// On-disk JSON-backed map from a cache key to a timestamped entry — the
/// foundation every persistent cache builds on.
///
/// The whole map is loaded at construction and re-serialized on every
/// mutation. Write volume is bounded by the symbol universe, so whole-file
/// writes are acceptable here; they would not be at scale.
///
/// Writes go through a sibling temp file and an atomic rename, so a crash
/// mid-write never leaves a truncated cache file. A failed write is logged
/// and returned as an error, but the in-memory map still reflects the
/// update — subsequent in-process reads see it.
pub struct JsonStore<T> {
    path: PathBuf,
    entries: HashMap<String, CacheEntry<T>>,
    clock: Clock,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Open a store backed by `path`. A missing or corrupt file is treated
    /// as an empty cache, never as a fatal error.
    pub fn open(path: impl Into<PathBuf>, clock: Clock) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        Self {
            path,
            entries,
            clock,
        }
    }

    fn load(path: &Path) -> HashMap<String, CacheEntry<T>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "cache file not found, starting empty");
                return HashMap::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache file, starting empty");
                return HashMap::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache file, starting empty");
                HashMap::new()
            }
        }
    }

    /// Look up an entry. Missing keys are `None`, never an error.
    pub fn get(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    /// Overwrite an entry and immediately persist the full map.
    pub fn set(&mut self, key: impl Into<String>, value: T) -> Result<(), CoreError> {
        self.set_with_price_date(key, value, None)
    }

    /// Like `set`, additionally recording the as-of date of the priced data.
    pub fn set_with_price_date(
        &mut self,
        key: impl Into<String>,
        value: T,
        price_date: Option<NaiveDate>,
    ) -> Result<(), CoreError> {
        let key = key.into();
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                fetched_at: self.clock.now(),
                price_date,
            },
        );

        if let Err(e) = self.persist() {
            // The in-memory map keeps the update; the file lags until the
            // next successful write. Surface the failure so callers can act.
            error!(path = %self.path.display(), key = %key, error = %e, "cache write failed");
            return Err(e);
        }
        Ok(())
    }

    /// Wipe the in-memory map and the backing file. Returns the number of
    /// entries removed. Irreversible; administrative use only.
    pub fn clear_all(&mut self) -> Result<usize, CoreError> {
        let count = self.entries.len();
        self.entries.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(count)
    }

    fn persist(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;

        // Temp file + rename: a crash mid-write leaves the old file intact.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry<T>)> {
        self.entries.iter()
    }

    /// Age of an entry relative to the injected clock.
    pub fn age_of(&self, key: &str) -> Option<chrono::Duration> {
        self.entries
            .get(key)
            .map(|e| self.clock.now() - e.fetched_at)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}
