// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port for engines embedding this crate
//! (spec.md SPEC_FULL.md §4.G: persists `HistoryOptions`/`SyncOptions`
//! defaults across process restarts — orthogonal to the out-of-scope
//! store-state persistence plugin of §6).

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    ///
    /// # Errors
    /// Returns [`ConfigError::NotFound`] when `key` has never been saved,
    /// or another variant on an underlying storage failure.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] on an underlying storage failure.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Thin service that serializes config values and delegates storage to a
/// [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)`
    /// if missing.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] on a storage failure other than
    /// not-found, or on malformed JSON.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist a config value for `key`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] on a storage failure.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

/// Defaults for `HistoryOptions`/`SyncOptions` that an embedding tool may
/// want to persist across restarts rather than hardcode. Separate from the
/// live `jods_history::HistoryOptions`/`jods_sync::SyncOptions` types
/// (which carry non-serializable callback fields) — this is the
/// serializable subset a `ConfigStore` can round-trip.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct EngineDefaults {
    /// `HistoryOptions::max_entries` default.
    pub history_max_entries: usize,
    /// `HistoryOptions::throttle`, in milliseconds.
    pub history_throttle_ms: u64,
    /// `SyncOptions::throttle_ms` default.
    pub sync_throttle_ms: u64,
    /// `SyncOptions::max_message_size` default, if any.
    pub sync_max_message_size: Option<usize>,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            history_max_entries: 50,
            history_throttle_ms: 100,
            sync_throttle_ms: 100,
            sync_max_message_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct MemoryStore {
        blobs: RefCell<HashMap<String, Vec<u8>>>,
    }

    impl ConfigStore for MemoryStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
            self.blobs.borrow().get(key).cloned().ok_or(ConfigError::NotFound)
        }

        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
            self.blobs.borrow_mut().insert(key.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn round_trips_engine_defaults_through_a_store() {
        let service = ConfigService::new(MemoryStore {
            blobs: RefCell::new(HashMap::new()),
        });
        assert!(service.load::<EngineDefaults>("engine").unwrap().is_none());

        let defaults = EngineDefaults {
            history_max_entries: 200,
            ..EngineDefaults::default()
        };
        service.save("engine", &defaults).unwrap();

        let loaded = service.load::<EngineDefaults>("engine").unwrap().unwrap();
        assert_eq!(loaded.history_max_entries, 200);
    }
}
