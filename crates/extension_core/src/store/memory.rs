//! Non-durable store used when no database is available.

use super::{StateStore, StoreResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Process-local document store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    documents: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(documents.get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        documents.insert(key.to_string(), value);
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
