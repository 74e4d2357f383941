//! # Store Manager
//!
//! Owns every open logical database and its named stores.
//!
//! Databases are unique by name within one manager; stores are unique within
//! their database and are only ever added (append-only schema). A failed
//! lookup names the missing entity and the call that would create it.

use super::{Database, MemoryDatabase, RedbDatabase, StoreHandle};
use crate::config::{AlpConfig, Persistence};
use crate::primitives::{DB_FILE_EXTENSION, WRITE_CHECK_FILE};
use crate::{AlpError, lock, names};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Backend chosen at open time.
#[derive(Debug, Clone)]
enum Backend {
    Redb { data_dir: PathBuf },
    Memory,
}

/// The set of open databases.
#[derive(Debug)]
pub struct StoreManager {
    backend: Backend,
    default_store: String,
    databases: Mutex<BTreeMap<String, Database>>,
}

impl StoreManager {
    /// Choose the backend, open the default database and, on disk, discover
    /// databases already present in the data directory.
    pub fn open(config: &AlpConfig) -> Result<Self, AlpError> {
        config.validate()?;
        let backend = select_backend(config)?;

        let manager = Self {
            backend,
            default_store: config.default_store.clone(),
            databases: Mutex::new(BTreeMap::new()),
        };

        let default = manager.open_database(&config.default_db, &[config.default_store.clone()])?;
        lock(&manager.databases).insert(config.default_db.clone(), default);

        if let Backend::Redb { data_dir } = &manager.backend {
            manager.discover(data_dir)?;
        }
        Ok(manager)
    }

    /// True when records survive the process.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::Redb { .. })
    }

    /// Directory of the redb files, when persistent.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Redb { data_dir } => Some(data_dir),
            Backend::Memory => None,
        }
    }

    /// Create and register a database with the given stores.
    ///
    /// An empty store list falls back to the default store.
    pub async fn create_database(&self, name: &str, stores: &[&str]) -> Result<(), AlpError> {
        names::validate_db_name(name)?;
        let mut store_names: Vec<String> = Vec::new();
        for store in stores {
            names::validate_store_name(store)?;
            if !store_names.iter().any(|s| s == store) {
                store_names.push((*store).to_string());
            }
        }
        if store_names.is_empty() {
            store_names.push(self.default_store.clone());
        }

        let mut databases = lock(&self.databases);
        if databases.contains_key(name) {
            return Err(AlpError::DatabaseExists(name.to_string()));
        }
        let database = self.open_database(name, &store_names)?;
        databases.insert(name.to_string(), database);
        info!(db = name, stores = ?store_names, "created database");
        Ok(())
    }

    /// Append a store to an existing database.
    ///
    /// The manifest read, version bump and table creation happen under the
    /// manager lock in a single write transaction.
    pub async fn create_store(&self, db: &str, store: &str) -> Result<StoreHandle, AlpError> {
        names::validate_store_name(store)?;
        let mut databases = lock(&self.databases);
        let database = databases
            .get_mut(db)
            .ok_or_else(|| AlpError::DatabaseNotFound {
                db: db.to_string(),
                store: store.to_string(),
            })?;
        if database.has_store(store) {
            return Err(AlpError::StoreExists {
                db: db.to_string(),
                store: store.to_string(),
            });
        }
        let handle = database.add_store(store)?;
        info!(db, store, version = database.version(), "added store");
        Ok(handle)
    }

    /// Handle to `db`/`store`, distinguishing a missing database from a
    /// missing store.
    pub async fn get_store(&self, db: &str, store: &str) -> Result<StoreHandle, AlpError> {
        self.resolve(db, store)
    }

    pub(crate) fn resolve(&self, db: &str, store: &str) -> Result<StoreHandle, AlpError> {
        let databases = lock(&self.databases);
        let database = databases.get(db).ok_or_else(|| AlpError::DatabaseNotFound {
            db: db.to_string(),
            store: store.to_string(),
        })?;
        database.store(store).ok_or_else(|| AlpError::StoreNotFound {
            db: db.to_string(),
            store: store.to_string(),
        })
    }

    /// Whether `name` is open.
    #[must_use]
    pub fn has_database(&self, name: &str) -> bool {
        lock(&self.databases).contains_key(name)
    }

    /// Whether `db` is open and has `store`.
    #[must_use]
    pub fn has_store(&self, db: &str, store: &str) -> bool {
        lock(&self.databases)
            .get(db)
            .is_some_and(|database| database.has_store(store))
    }

    /// Same as [`Self::has_store`]; reads as `has(db, store)` at call sites.
    #[must_use]
    pub fn has(&self, db: &str, store: &str) -> bool {
        self.has_store(db, store)
    }

    /// Open database names, sorted.
    #[must_use]
    pub fn list_databases(&self) -> Vec<String> {
        lock(&self.databases).keys().cloned().collect()
    }

    /// Store names of `db` in creation order; empty when `db` is not open.
    #[must_use]
    pub fn list_stores(&self, db: &str) -> Vec<String> {
        lock(&self.databases)
            .get(db)
            .map(Database::store_names)
            .unwrap_or_default()
    }

    /// Schema version of `db`, when open.
    #[must_use]
    pub fn version(&self, db: &str) -> Option<u64> {
        lock(&self.databases).get(db).map(Database::version)
    }

    /// Close and unregister `name`, keeping its data. Idempotent.
    pub fn close_database(&self, name: &str) -> Option<Database> {
        let closed = lock(&self.databases).remove(name);
        if closed.is_some() {
            info!(db = name, "closed database");
        }
        closed
    }

    /// Close `name` and remove all of its data. Idempotent.
    pub async fn delete_database(&self, name: &str) -> Result<(), AlpError> {
        let closed = self.close_database(name);
        let file = match (&closed, &self.backend) {
            (Some(Database::Redb(db)), _) => Some(db.file().to_path_buf()),
            (_, Backend::Redb { data_dir }) if names::validate_db_name(name).is_ok() => {
                Some(db_file(data_dir, name))
            }
            _ => None,
        };
        drop(closed);

        if let Some(file) = file {
            match std::fs::remove_file(&file) {
                Ok(()) => info!(db = name, file = %file.display(), "deleted database"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(AlpError::Storage(e.to_string())),
            }
        }
        Ok(())
    }

    fn open_database(&self, name: &str, stores: &[String]) -> Result<Database, AlpError> {
        match &self.backend {
            Backend::Memory => Ok(Database::Memory(MemoryDatabase::new(stores))),
            Backend::Redb { data_dir } => {
                RedbDatabase::open(&db_file(data_dir, name), stores).map(Database::Redb)
            }
        }
    }

    /// Register every manifest-carrying `<name>.redb` in `data_dir`.
    fn discover(&self, data_dir: &Path) -> Result<(), AlpError> {
        let entries = std::fs::read_dir(data_dir).map_err(|e| AlpError::Storage(e.to_string()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == DB_FILE_EXTENSION))
            .collect();
        files.sort();

        let mut databases = lock(&self.databases);
        for file in files {
            let Some(name) = file.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if databases.contains_key(&name) || names::validate_db_name(&name).is_err() {
                continue;
            }
            match RedbDatabase::open_existing(&file) {
                Ok(Some(db)) => {
                    debug!(db = %name, stores = ?db.store_names(), "discovered database");
                    databases.insert(name, Database::Redb(db));
                }
                Ok(None) => warn!(file = %file.display(), "skipping redb file without manifest"),
                Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable database"),
            }
        }
        Ok(())
    }
}

fn db_file(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{name}.{DB_FILE_EXTENSION}"))
}

/// Decide the backend once, checking the data directory when needed.
fn select_backend(config: &AlpConfig) -> Result<Backend, AlpError> {
    match (config.persistence, &config.data_dir) {
        (Persistence::Memory, _) => Ok(Backend::Memory),
        (Persistence::Redb, Some(dir)) => {
            check_writable(dir)?;
            Ok(Backend::Redb {
                data_dir: dir.clone(),
            })
        }
        (Persistence::Redb, None) => Err(AlpError::Config(
            "persistence = \"redb\" requires data_dir".to_string(),
        )),
        (Persistence::Auto, Some(dir)) => match check_writable(dir) {
            Ok(()) => Ok(Backend::Redb {
                data_dir: dir.clone(),
            }),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "data directory unusable - using memory storage");
                Ok(Backend::Memory)
            }
        },
        (Persistence::Auto, None) => {
            debug!("no data directory configured - using memory storage");
            Ok(Backend::Memory)
        }
    }
}

/// Create the directory if needed and check a file can be written there.
fn check_writable(dir: &Path) -> Result<(), AlpError> {
    let storage = |e: std::io::Error| AlpError::Storage(format!("{}: {}", dir.display(), e));
    std::fs::create_dir_all(dir).map_err(storage)?;
    let scratch = dir.join(WRITE_CHECK_FILE);
    std::fs::write(&scratch, b"alp").map_err(storage)?;
    std::fs::remove_file(&scratch).map_err(storage)
}

// =============================================================================
// TESTS
// =============================================================================
