//! # Path Codec
//!
//! Record addresses have the form `[database/][store:]record`:
//!
//! ```text
//! bills.jan            -> AlpDB / alp  : bills.jan
//! data:bills.jan       -> AlpDB / data : bills.jan
//! Work/data:bills.jan  -> Work  / data : bills.jan
//! Work/:bills.jan      -> Work  / alp  : bills.jan
//! ```
//!
//! Only the first `/` and the first `:` after it are structural. Everything
//! else, dots included, belongs to the record name. Parsing is total: any
//! string yields a path, with missing or empty segments taking the defaults.
//!
//! The canonical form `db/store:record` is the registry key; two inputs
//! address the same record iff their canonical forms are equal.

use crate::primitives::{DEFAULT_DB, DEFAULT_STORE};
use std::fmt;

/// A fully resolved record address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordPath {
    /// Database name.
    pub db: String,
    /// Store name within the database.
    pub store: String,
    /// Record name within the store.
    pub record: String,
}

impl RecordPath {
    /// Create a path from its three segments.
    #[must_use]
    pub fn new(db: impl Into<String>, store: impl Into<String>, record: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            store: store.into(),
            record: record.into(),
        }
    }

    /// The always-qualified `db/store:record` form.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}/{}:{}", self.db, self.store, self.record)
    }

    /// The `db/store` key under which `load_all` groups this path's store.
    #[must_use]
    pub fn group_key(&self) -> String {
        format!("{}/{}", self.db, self.store)
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.db, self.store, self.record)
    }
}

/// Parses and builds paths against a pair of default segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCodec {
    default_db: String,
    default_store: String,
}

impl Default for PathCodec {
    fn default() -> Self {
        Self::new(DEFAULT_DB, DEFAULT_STORE)
    }
}

impl PathCodec {
    /// Create a codec with the given defaults.
    ///
    /// Defaults are expected to be valid names (see `AlpConfig::validate`).
    #[must_use]
    pub fn new(default_db: impl Into<String>, default_store: impl Into<String>) -> Self {
        Self {
            default_db: default_db.into(),
            default_store: default_store.into(),
        }
    }

    /// The database used when a path omits one.
    #[must_use]
    pub fn default_db(&self) -> &str {
        &self.default_db
    }

    /// The store used when a path omits one.
    #[must_use]
    pub fn default_store(&self) -> &str {
        &self.default_store
    }

    /// Split `input` into database, store and record.
    #[must_use]
    pub fn parse(&self, input: &str) -> RecordPath {
        let trimmed = input.trim();

        let (db, rest) = match trimmed.split_once('/') {
            Some((db, rest)) => (db, rest),
            None => ("", trimmed),
        };
        let (store, record) = match rest.split_once(':') {
            Some((store, record)) => (store, record),
            None => ("", rest),
        };

        RecordPath {
            db: self.or_default_db(db).to_string(),
            store: self.or_default_store(store).to_string(),
            record: record.to_string(),
        }
    }

    /// Build the shortest string that parses back to `(db, store, record)`.
    ///
    /// Default segments are omitted: `record`, `store:record`, `db/:record`,
    /// `db/store:record`. A short form is skipped when the record itself would
    /// be misread as structure (`/:a/b`, `:a:b`) or lose leading whitespace.
    #[must_use]
    pub fn build(&self, db: &str, store: &str, record: &str) -> String {
        let default_db = db.is_empty() || db == self.default_db;
        let default_store = store.is_empty() || store == self.default_store;
        let store_part = if default_store { "" } else { store };

        let store_is_plain = !store_part.contains('/') && !store_part.starts_with(char::is_whitespace);
        if default_db && store_is_plain && !record.contains('/') {
            if default_store && !record.contains(':') && !record.starts_with(char::is_whitespace) {
                return record.to_string();
            }
            return format!("{store_part}:{record}");
        }

        let db_part = if default_db { "" } else { db };
        format!("{db_part}/{store_part}:{record}")
    }

    /// Short form of an already resolved path.
    #[must_use]
    pub fn build_path(&self, path: &RecordPath) -> String {
        self.build(&path.db, &path.store, &path.record)
    }

    /// The fully qualified `db/store:record` form of `input`.
    #[must_use]
    pub fn canonical(&self, input: &str) -> String {
        self.parse(input).canonical()
    }

    /// The shortest equivalent spelling of `input`.
    #[must_use]
    pub fn display(&self, input: &str) -> String {
        self.build_path(&self.parse(input))
    }

    /// Only the record segment of `input`.
    #[must_use]
    pub fn record(&self, input: &str) -> String {
        self.parse(input).record
    }

    /// Whether two inputs address the same record.
    #[must_use]
    pub fn equals(&self, a: &str, b: &str) -> bool {
        self.canonical(a) == self.canonical(b)
    }

    fn or_default_db<'a>(&'a self, segment: &'a str) -> &'a str {
        if segment.is_empty() {
            &self.default_db
        } else {
            segment
        }
    }

    fn or_default_store<'a>(&'a self, segment: &'a str) -> &'a str {
        if segment.is_empty() {
            &self.default_store
        } else {
            segment
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
