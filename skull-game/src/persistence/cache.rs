//! Local durable cache: one JSON record per key.
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

use crate::state::GameState;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Synchronous key/value store for serialized snapshots.
pub trait LocalCache {
    /// Read the raw record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Replace the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Delete the record; missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store refuses the removal.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

impl<T: LocalCache + ?Sized> LocalCache for Rc<T> {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        (**self).remove(key)
    }
}

/// One file per key inside a directory. Writes go through a temporary file
/// and a rename so a crash never leaves half a record behind.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl LocalCache for FileCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// In-memory cache. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    records: Rc<RefCell<HashMap<String, String>>>,
    failing: Rc<Cell<bool>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.records.borrow().get(key).cloned()
    }
}

impl LocalCache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.raw(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        if self.failing.get() {
            return Err(io::Error::other("memory cache is failing").into());
        }
        self.records
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.records.borrow_mut().remove(key);
        Ok(())
    }
}

/// How the startup state was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    Missing,
    Parsed,
    /// Parsed field by field; the listed keys were unusable.
    Recovered { dropped: Vec<String> },
    /// The record was not a JSON object and has been deleted.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState {
    pub state: GameState,
    pub source: LoadSource,
}

/// Write the full snapshot under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the cache write fails.
pub fn save_state<C: LocalCache + ?Sized>(
    cache: &C,
    key: &str,
    state: &GameState,
) -> Result<(), CacheError> {
    let json = serde_json::to_string(state)?;
    cache.write(key, &json)
}

/// Read the startup state. Never fails: unreadable records degrade to
/// defaults and partially valid ones keep every field that still parses.
pub fn load_state<C: LocalCache + ?Sized>(cache: &C, key: &str) -> LoadedState {
    let text = match cache.read(key) {
        Ok(Some(text)) => text,
        Ok(None) => {
            return LoadedState {
                state: GameState::default(),
                source: LoadSource::Missing,
            };
        }
        Err(err) => {
            log::warn!("local cache read failed, starting fresh: {err}");
            return LoadedState {
                state: GameState::default(),
                source: LoadSource::Missing,
            };
        }
    };

    if let Ok(mut state) = serde_json::from_str::<GameState>(&text) {
        state.sanitize();
        return LoadedState {
            state,
            source: LoadSource::Parsed,
        };
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(stored)) => {
            let (mut state, dropped) = recover_fields(stored);
            log::warn!(
                "local cache record was partially corrupt; dropped fields: {}",
                dropped.join(", ")
            );
            state.sanitize();
            LoadedState {
                state,
                source: LoadSource::Recovered { dropped },
            }
        }
        _ => {
            log::warn!("local cache record is not a JSON object; discarding it");
            if let Err(err) = cache.remove(key) {
                log::warn!("failed to remove corrupt cache record: {err}");
            }
            LoadedState {
                state: GameState::default(),
                source: LoadSource::Discarded,
            }
        }
    }
}

/// Overlay stored keys onto the default record one at a time, keeping each
/// key only if the record still deserializes with it.
fn recover_fields(stored: Map<String, Value>) -> (GameState, Vec<String>) {
    let mut base = match serde_json::to_value(GameState::default()) {
        Ok(Value::Object(map)) => map,
        _ => return (GameState::default(), stored.into_iter().map(|(k, _)| k).collect()),
    };
    let mut dropped = Vec::new();

    for (key, value) in stored {
        // The legacy spelling replaces the current one.
        let field = if key == "miners" {
            "passiveUnits".to_string()
        } else {
            key.clone()
        };
        let mut candidate = base.clone();
        candidate.insert(field, value);
        if serde_json::from_value::<GameState>(Value::Object(candidate.clone())).is_ok() {
            base = candidate;
        } else {
            dropped.push(key);
        }
    }

    let state = serde_json::from_value(Value::Object(base)).unwrap_or_default();
    (state, dropped)
}
