//! Durable key-value store for extension state.
//!
//! # Responsibility
//! - Define the whole-document get/put contract used by the environment.
//! - Provide SQLite-backed and in-memory implementations.
//! - Fall back to the in-memory store when the durable backend cannot open.
//!
//! # Invariants
//! - Documents are read and written whole; there are no key-level updates.
//! - A missing document reads as its empty value.
//! - The open-time fallback is the only store failure that is not surfaced.

use crate::db::DbError;
use crate::extension::finder::Catalog;
use crate::extension::manifest::ConfigMap;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

mod memory;
mod sqlite;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

/// Document key holding the last detected catalog.
pub const AVAILABLE_KEY: &str = "extensions.available";
/// Document key holding the activation record.
pub const ACTIVE_KEY: &str = "extensions.active";

/// Activation record in activation order: extension name to the config
/// captured at activation. Persisted as one JSON object whose key order is
/// the activation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigMap", into = "ConfigMap")]
pub struct ActiveSet {
    entries: Vec<(String, ConfigMap)>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name`; re-activating keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, config: ConfigMap) {
        let name = name.into();
        match self.entries.iter_mut().find(|(entry, _)| *entry == name) {
            Some((_, slot)) => *slot = config,
            None => self.entries.push((name, config)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ConfigMap> {
        let index = self.entries.iter().position(|(entry, _)| entry == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get(&self, name: &str) -> Option<&ConfigMap> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, config)| config)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names in activation order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for ActiveSet {
    type Item = (String, ConfigMap);
    type IntoIter = std::vec::IntoIter<(String, ConfigMap)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl TryFrom<ConfigMap> for ActiveSet {
    type Error = String;

    fn try_from(document: ConfigMap) -> Result<Self, Self::Error> {
        let mut actives = Self::new();
        for (name, value) in document {
            let config = match value {
                Value::Object(config) => config,
                Value::Null => ConfigMap::new(),
                other => {
                    return Err(format!(
                        "active entry `{name}` must be an object, got `{other}`"
                    ))
                }
            };
            actives.insert(name, config);
        }
        Ok(actives)
    }
}

impl From<ActiveSet> for ConfigMap {
    fn from(actives: ActiveSet) -> Self {
        actives
            .entries
            .into_iter()
            .map(|(name, config)| (name, Value::Object(config)))
            .collect()
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Whole-document persistence contract.
pub trait StateStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;
    fn put(&self, key: &str, value: Value) -> StoreResult<()>;
    /// Whether written state survives a process restart.
    fn is_durable(&self) -> bool;
}

/// Opens the durable store at `path`, falling back to a non-durable
/// in-memory store when no path is configured or the database cannot open.
pub fn connect_state_store(path: Option<&Path>) -> Box<dyn StateStore> {
    let Some(path) = path else {
        info!("event=state_store_connect module=store status=ok driver=memory");
        return Box::new(MemoryStateStore::new());
    };

    match SqliteStateStore::open(path) {
        Ok(store) => {
            info!(
                "event=state_store_connect module=store status=ok driver=sqlite path={}",
                path.display()
            );
            Box::new(store)
        }
        Err(err) => {
            warn!(
                "event=state_store_connect module=store status=fallback driver=memory error_code=store_unavailable path={} error={}",
                path.display(),
                err
            );
            Box::new(MemoryStateStore::new())
        }
    }
}

/// Reads the persisted catalog; empty when never detected.
pub fn load_catalog(store: &dyn StateStore) -> StoreResult<Catalog> {
    read_document(store, AVAILABLE_KEY)
}

/// Replaces the persisted catalog.
pub fn save_catalog(store: &dyn StateStore, catalog: &Catalog) -> StoreResult<()> {
    write_document(store, AVAILABLE_KEY, catalog)
}

/// Reads the persisted activation record; empty when never written.
pub fn load_active_set(store: &dyn StateStore) -> StoreResult<ActiveSet> {
    read_document(store, ACTIVE_KEY)
}

/// Replaces the persisted activation record.
pub fn save_active_set(store: &dyn StateStore, actives: &ActiveSet) -> StoreResult<()> {
    write_document(store, ACTIVE_KEY, actives)
}

fn read_document<T: DeserializeOwned + Default>(
    store: &dyn StateStore,
    key: &str,
) -> StoreResult<T> {
    match store.get(key)? {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        }),
    }
}

fn write_document<T: Serialize>(store: &dyn StateStore, key: &str, document: &T) -> StoreResult<()> {
    let value = serde_json::to_value(document).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.put(key, value)
}

/// Store operation errors, propagated unchanged to callers.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Encode {
        key: String,
        source: serde_json::Error,
    },
    Corrupt {
        key: String,
        source: serde_json::Error,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Encode { key, source } => write!(f, "cannot encode `{key}`: {source}"),
            Self::Corrupt { key, source } => {
                write!(f, "persisted `{key}` is corrupt: {source}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode { source, .. } | Self::Corrupt { source, .. } => Some(source),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
