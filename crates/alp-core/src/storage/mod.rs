//! # Storage
//!
//! Databases, stores and the manager that owns them.
//!
//! ## Storage Backends
//!
//! - `Redb`: one redb file per database, one table per store (persistent)
//! - `Memory`: `BTreeMap` tables behind a mutex (volatile)
//!
//! The backend is chosen once when the [`StoreManager`] opens. Both expose
//! the same store surface through [`StoreHandle`].

mod manager;
mod manifest;
mod memory;
mod redb_store;

pub use manager::StoreManager;
pub use manifest::SchemaManifest;
pub use memory::{MemoryDatabase, MemoryStore};
pub use redb_store::{RedbDatabase, RedbStore};

use crate::{AlpError, Record};

/// Handle to one store, whichever backend holds it. Cheap to clone.
#[derive(Debug, Clone)]
pub enum StoreHandle {
    /// Table inside a redb file.
    Redb(RedbStore),
    /// In-memory table.
    Memory(MemoryStore),
}

impl StoreHandle {
    /// Fetch the record named `key`.
    pub async fn get(&self, key: &str) -> Result<Option<Record>, AlpError> {
        match self {
            Self::Redb(store) => store.get(key),
            Self::Memory(store) => Ok(store.get(key)),
        }
    }

    /// Insert or replace a record.
    pub async fn put(&self, record: Record) -> Result<(), AlpError> {
        match self {
            Self::Redb(store) => store.put(&record),
            Self::Memory(store) => {
                store.put(record);
                Ok(())
            }
        }
    }

    /// Remove the record named `key`; absent keys are not an error.
    pub async fn delete(&self, key: &str) -> Result<(), AlpError> {
        match self {
            Self::Redb(store) => store.delete(key),
            Self::Memory(store) => {
                store.delete(key);
                Ok(())
            }
        }
    }

    /// Every record, ascending by name.
    pub async fn to_array(&self) -> Result<Vec<Record>, AlpError> {
        match self {
            Self::Redb(store) => store.to_array(),
            Self::Memory(store) => Ok(store.to_array()),
        }
    }

    /// Start a field filter: `store.where_field("name").starts_with("x.").to_array()`.
    #[must_use]
    pub fn where_field<'a>(&'a self, field: &'a str) -> WhereClause<'a> {
        WhereClause { store: self, field }
    }

    /// Number of records.
    pub async fn count(&self) -> Result<u64, AlpError> {
        match self {
            Self::Redb(store) => store.count(),
            Self::Memory(store) => Ok(store.count()),
        }
    }

    /// Remove every record.
    pub async fn clear(&self) -> Result<(), AlpError> {
        match self {
            Self::Redb(store) => store.clear(),
            Self::Memory(store) => {
                store.clear();
                Ok(())
            }
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Record>, AlpError> {
        match self {
            Self::Redb(store) => store.scan_prefix(prefix),
            Self::Memory(store) => Ok(store.scan_prefix(prefix)),
        }
    }
}

/// A pending `where(field)` filter on a store.
#[derive(Debug, Clone, Copy)]
pub struct WhereClause<'a> {
    store: &'a StoreHandle,
    field: &'a str,
}

impl<'a> WhereClause<'a> {
    /// Keep records whose field value starts with `prefix`.
    #[must_use]
    pub fn starts_with(self, prefix: &'a str) -> StartsWith<'a> {
        StartsWith {
            clause: self,
            prefix,
        }
    }
}

/// A `where(field).startsWith(prefix)` query, ready to run.
#[derive(Debug, Clone, Copy)]
pub struct StartsWith<'a> {
    clause: WhereClause<'a>,
    prefix: &'a str,
}

impl StartsWith<'_> {
    /// Run the query.
    ///
    /// `name` scans by key. `data` matches records whose payload is a string.
    /// Any other field matches nothing, as no other field exists on a record.
    pub async fn to_array(self) -> Result<Vec<Record>, AlpError> {
        match self.clause.field {
            "name" => self.clause.store.scan_prefix(self.prefix).await,
            "data" => Ok(self
                .clause
                .store
                .to_array()
                .await?
                .into_iter()
                .filter(|r| r.data.as_str().is_some_and(|s| s.starts_with(self.prefix)))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}

/// One open logical database.
#[derive(Debug)]
pub enum Database {
    /// redb file.
    Redb(RedbDatabase),
    /// In-memory tables.
    Memory(MemoryDatabase),
}

impl Database {
    /// Schema version; starts at 1 and grows by one per added store.
    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            Self::Redb(db) => db.version(),
            Self::Memory(db) => db.version(),
        }
    }

    /// Store names in creation order.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        match self {
            Self::Redb(db) => db.store_names(),
            Self::Memory(db) => db.store_names(),
        }
    }

    /// Whether the database has `store`.
    #[must_use]
    pub fn has_store(&self, store: &str) -> bool {
        self.store(store).is_some()
    }

    /// Handle to `store`, if present.
    #[must_use]
    pub fn store(&self, store: &str) -> Option<StoreHandle> {
        match self {
            Self::Redb(db) => db.store(store).map(StoreHandle::Redb),
            Self::Memory(db) => db.store(store).map(StoreHandle::Memory),
        }
    }

    fn add_store(&mut self, store: &str) -> Result<StoreHandle, AlpError> {
        match self {
            Self::Redb(db) => db.add_store(store).map(StoreHandle::Redb),
            Self::Memory(db) => db.add_store(store).map(StoreHandle::Memory),
        }
    }
}
