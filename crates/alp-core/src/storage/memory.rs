//! # In-Memory Storage
//!
//! Substituted for redb when no usable data directory exists. Same surface,
//! same ordering (ascending by record name), nothing survives the process.

use crate::lock;
use crate::{AlpError, Record};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// One in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub(crate) fn get(&self, key: &str) -> Option<Record> {
        lock(&self.rows)
            .get(key)
            .map(|data| Record::new(key, data.clone()))
    }

    pub(crate) fn put(&self, record: Record) {
        lock(&self.rows).insert(record.name, record.data);
    }

    pub(crate) fn delete(&self, key: &str) {
        lock(&self.rows).remove(key);
    }

    pub(crate) fn to_array(&self) -> Vec<Record> {
        lock(&self.rows)
            .iter()
            .map(|(name, data)| Record::new(name.clone(), data.clone()))
            .collect()
    }

    pub(crate) fn scan_prefix(&self, prefix: &str) -> Vec<Record> {
        lock(&self.rows)
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, data)| Record::new(name.clone(), data.clone()))
            .collect()
    }

    pub(crate) fn count(&self) -> u64 {
        lock(&self.rows).len() as u64
    }

    pub(crate) fn clear(&self) {
        lock(&self.rows).clear();
    }
}

/// An in-memory database: named tables plus a schema version.
#[derive(Debug)]
pub struct MemoryDatabase {
    stores: BTreeMap<String, MemoryStore>,
    order: Vec<String>,
    version: u64,
}

impl MemoryDatabase {
    pub(crate) fn new(stores: &[String]) -> Self {
        let mut db = Self {
            stores: BTreeMap::new(),
            order: Vec::new(),
            version: 1,
        };
        for store in stores {
            if !db.stores.contains_key(store) {
                db.stores.insert(store.clone(), MemoryStore::default());
                db.order.push(store.clone());
            }
        }
        db
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn store_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub(crate) fn store(&self, name: &str) -> Option<MemoryStore> {
        self.stores.get(name).cloned()
    }

    pub(crate) fn add_store(&mut self, name: &str) -> Result<MemoryStore, AlpError> {
        let store = MemoryStore::default();
        self.stores.insert(name.to_string(), store.clone());
        self.order.push(name.to_string());
        self.version = self.version.saturating_add(1);
        Ok(store)
    }
}
