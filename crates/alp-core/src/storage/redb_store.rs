//! # redb-backed Record Storage
//!
//! One redb file per logical database, one redb table per store. Rows are
//! keyed by record name and hold the JSON-encoded payload.
//!
//! redb provides:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! The schema (store list + version) lives in the reserved manifest table and
//! is updated in the same write transaction that creates a store's table.

use super::manifest::SchemaManifest;
use crate::primitives::{MANIFEST_KEY, MANIFEST_TABLE};
use crate::{AlpError, Record};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rows of one store: record name -> JSON bytes.
type RecordTable<'a> = TableDefinition<'a, &'static str, &'static [u8]>;

/// Manifest table: single row keyed by `MANIFEST_KEY`.
const MANIFEST: TableDefinition<&str, &[u8]> = TableDefinition::new(MANIFEST_TABLE);

fn io_err(e: impl std::fmt::Display) -> AlpError {
    AlpError::Storage(e.to_string())
}

fn encode(record: &Record) -> Result<Vec<u8>, AlpError> {
    serde_json::to_vec(&record.data).map_err(|e| AlpError::Serialization(e.to_string()))
}

fn decode(name: &str, bytes: &[u8]) -> Result<Record, AlpError> {
    let data = serde_json::from_slice(bytes).map_err(|e| AlpError::Serialization(e.to_string()))?;
    Ok(Record::new(name, data))
}

// =============================================================================
// STORE
// =============================================================================

/// Handle to one table inside a redb database.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    table: String,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    fn definition(&self) -> RecordTable<'_> {
        TableDefinition::new(&self.table)
    }

    pub(crate) fn get(&self, key: &str) -> Result<Option<Record>, AlpError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(self.definition()).map_err(io_err)?;
        match table.get(key).map_err(io_err)? {
            Some(bytes) => decode(key, bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn put(&self, record: &Record) -> Result<(), AlpError> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(self.definition()).map_err(io_err)?;
            table
                .insert(record.name.as_str(), bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    pub(crate) fn delete(&self, key: &str) -> Result<(), AlpError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(self.definition()).map_err(io_err)?;
            table.remove(key).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    pub(crate) fn to_array(&self) -> Result<Vec<Record>, AlpError> {
        self.collect(|_| true)
    }

    pub(crate) fn scan_prefix(&self, prefix: &str) -> Result<Vec<Record>, AlpError> {
        self.collect(|name| name.starts_with(prefix))
    }

    fn collect(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<Record>, AlpError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(self.definition()).map_err(io_err)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, value) = entry.map_err(io_err)?;
            let name = key.value();
            if keep(name) {
                records.push(decode(name, value.value())?);
            }
        }
        Ok(records)
    }

    pub(crate) fn count(&self) -> Result<u64, AlpError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(self.definition()).map_err(io_err)?;
        table.len().map_err(io_err)
    }

    pub(crate) fn clear(&self) -> Result<(), AlpError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        write_txn.delete_table(self.definition()).map_err(io_err)?;
        {
            let _ = write_txn.open_table(self.definition()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }
}

// =============================================================================
// DATABASE
// =============================================================================

/// A redb file holding every store of one logical database.
pub struct RedbDatabase {
    db: Arc<Database>,
    file: PathBuf,
    manifest: SchemaManifest,
}

impl std::fmt::Debug for RedbDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDatabase")
            .field("file", &self.file)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl RedbDatabase {
    /// Open or create the file and make sure every store in `stores` exists.
    ///
    /// An existing file keeps its stores; missing ones are appended, one
    /// version bump each.
    pub(crate) fn open(file: &Path, stores: &[String]) -> Result<Self, AlpError> {
        let db = Database::create(file).map_err(io_err)?;
        let mut this = Self {
            manifest: read_manifest(&db)?.unwrap_or_else(|| SchemaManifest::initial(Vec::new())),
            db: Arc::new(db),
            file: file.to_path_buf(),
        };
        let fresh = this.manifest.stores.is_empty();
        for store in stores {
            if fresh {
                if !this.manifest.has_store(store) {
                    this.manifest.stores.push(store.clone());
                }
            } else {
                this.manifest.add_store(store);
            }
        }
        this.commit_schema()?;
        Ok(this)
    }

    /// Open an existing file without changing its schema.
    ///
    /// Returns `Ok(None)` for a redb file that carries no manifest.
    pub(crate) fn open_existing(file: &Path) -> Result<Option<Self>, AlpError> {
        let db = Database::create(file).map_err(io_err)?;
        Ok(read_manifest(&db)?.map(|manifest| Self {
            db: Arc::new(db),
            file: file.to_path_buf(),
            manifest,
        }))
    }

    pub(crate) fn file(&self) -> &Path {
        &self.file
    }

    pub(crate) fn version(&self) -> u64 {
        self.manifest.version
    }

    pub(crate) fn store_names(&self) -> Vec<String> {
        self.manifest.stores.clone()
    }

    pub(crate) fn store(&self, name: &str) -> Option<RedbStore> {
        self.manifest.has_store(name).then(|| RedbStore {
            db: Arc::clone(&self.db),
            table: name.to_string(),
        })
    }

    /// Append a store: create its table and bump the manifest in one
    /// transaction.
    pub(crate) fn add_store(&mut self, name: &str) -> Result<RedbStore, AlpError> {
        let mut next = self.manifest.clone();
        next.add_store(name);
        let bytes = next.to_bytes()?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let _ = write_txn
                .open_table(RecordTable::new(name))
                .map_err(io_err)?;
            let mut manifest = write_txn.open_table(MANIFEST).map_err(io_err)?;
            manifest
                .insert(MANIFEST_KEY, bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        self.manifest = next;
        Ok(RedbStore {
            db: Arc::clone(&self.db),
            table: name.to_string(),
        })
    }

    /// Write the manifest and create any table it names.
    fn commit_schema(&self) -> Result<(), AlpError> {
        let bytes = self.manifest.to_bytes()?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            for store in &self.manifest.stores {
                let _ = write_txn
                    .open_table(RecordTable::new(store))
                    .map_err(io_err)?;
            }
            let mut manifest = write_txn.open_table(MANIFEST).map_err(io_err)?;
            manifest
                .insert(MANIFEST_KEY, bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }
}

fn read_manifest(db: &Database) -> Result<Option<SchemaManifest>, AlpError> {
    let read_txn = db.begin_read().map_err(io_err)?;
    let table = match read_txn.open_table(MANIFEST) {
        Ok(table) => table,
        Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(e) => return Err(io_err(e)),
    };
    match table.get(MANIFEST_KEY).map_err(io_err)? {
        Some(bytes) => SchemaManifest::from_bytes(bytes.value()).map(Some),
        None => Ok(None),
    }
}

// =============================================================================
// TESTS
// =============================================================================
