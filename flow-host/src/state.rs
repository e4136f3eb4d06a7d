//! Plugin-scoped key/value state shared across runs
//!
//! The owning runtime creates one store per plugin instance and hands the
//! engine an `Arc` to it. The engine reads and writes but never clears it.

use flow_api::Value;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Thread-safe state mapping for one plugin instance
#[derive(Debug, Default)]
pub struct PluginState {
    values: RwLock<BTreeMap<String, Value>>,
}

impl PluginState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing values (e.g. restored from persistence)
    pub fn from_map(values: BTreeMap<String, Value>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Read-modify-write `key` under one write lock, returning the new value
    pub fn update<F>(&self, key: impl Into<String>, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let key = key.into();
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(values.get(&key));
        values.insert(key, next.clone());
        next
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Deep copy of the current mapping
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
