//! # Core Type Definitions
//!
//! This module contains the types shared across the Alp registry:
//! - Stored rows (`Record`) and their grouped view (`RecordEntry`, `LoadFilter`)
//! - Notification occasions (`Occasion`)
//! - Identifiers (`InstanceId`)
//! - Error types (`AlpError`, `ErrorKind`)
//!
//! ## Determinism Guarantees
//!
//! Identifiers implement `Ord` so every registry map can be a `BTreeMap`,
//! giving stable iteration order in tests and logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// =============================================================================
// RECORDS
// =============================================================================

/// One stored row: a record name and its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record name, unique within its store.
    pub name: String,
    /// Arbitrary JSON payload.
    pub data: Value,
}

impl Record {
    /// Create a new record.
    #[must_use]
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// A record as returned by `load_all`, decomposed for grouping.
///
/// The record name is split on its first `.`: the head is the `namespace`
/// and the remainder is the `sig`. A name without a dot has an empty `sig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    /// The raw record name.
    pub key: String,
    /// Shortest path that addresses this record.
    pub full_path: String,
    /// First dot-delimited segment of the name.
    pub namespace: String,
    /// Everything after the first dot.
    pub sig: String,
    /// The stored payload.
    pub data: Value,
}

impl RecordEntry {
    /// Decompose a record found in `db/store` into a grouped entry.
    #[must_use]
    pub fn from_record(record: Record, full_path: String) -> Self {
        let (namespace, sig) = match record.name.split_once('.') {
            Some((head, rest)) => (head.to_string(), rest.to_string()),
            None => (record.name.clone(), String::new()),
        };
        Self {
            key: record.name,
            full_path,
            namespace,
            sig,
            data: record.data,
        }
    }
}

/// Optional restriction for `load_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFilter {
    /// Only this database, when set.
    pub db: Option<String>,
    /// Only this store (in every matching database), when set.
    pub store: Option<String>,
}

impl LoadFilter {
    /// Restrict to one database.
    #[must_use]
    pub fn db(name: impl Into<String>) -> Self {
        Self {
            db: Some(name.into()),
            store: None,
        }
    }

    /// Further restrict to one store.
    #[must_use]
    pub fn with_store(mut self, name: impl Into<String>) -> Self {
        self.store = Some(name.into());
        self
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Why a bound instance is being pinged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Occasion {
    /// The instance is mounting (delivered to the instance itself only).
    Mount,
    /// An instance bound to the path became ready; payload is its host attributes.
    Ready,
    /// The record at the path was saved; payload is the new data.
    Save,
    /// The record at the path was deleted; no payload.
    Delete,
    /// An instance rebound onto the path; payload is `{from, to}`.
    PathChanged,
}

impl Occasion {
    /// Stable lowercase name, as used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Ready => "ready",
            Self::Save => "save",
            Self::Delete => "delete",
            Self::PathChanged => "path-changed",
        }
    }
}

impl fmt::Display for Occasion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identity of one mounted component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse classification of [`AlpError`] for callers that only need the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A database, store, element or component is absent.
    NotFound,
    /// A create/define collided with an existing name.
    AlreadyExists,
    /// A name or argument was rejected before touching state.
    InvalidInput,
    /// A component never reached, or left, the ready state.
    Lifecycle,
    /// Storage, encoding or configuration failure.
    Io,
}

/// Errors that can occur in the Alp registry.
///
/// Every variant carries owned strings only, so the error is `Clone` and one
/// failure can be handed to every waiter of a component.
#[derive(Debug, Clone, Error)]
pub enum AlpError {
    /// The database of a path is not open.
    #[error("Database '{db}' not found. Use create_database(\"{db}\", [\"{store}\"]) to create it.")]
    DatabaseNotFound { db: String, store: String },

    /// The database exists but lacks the store.
    #[error("Store '{store}' not found in database '{db}'. Use create_store(\"{db}\", \"{store}\") to create it.")]
    StoreNotFound { db: String, store: String },

    /// `create_database` with a name already open in this process.
    #[error("Database '{0}' already exists. Use get_store(\"{0}\", ...) to access it.")]
    DatabaseExists(String),

    /// `create_store` with a name already present in the database.
    #[error("Store '{store}' already exists in database '{db}'.")]
    StoreExists { db: String, store: String },

    /// A database or store name that cannot be addressed by a path.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A component tag suffix was defined twice.
    #[error("Component 'alp-{0}' is already defined")]
    AlreadyDefined(String),

    /// A selector that cannot be parsed.
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    /// A component method was called with arguments it cannot use.
    #[error("Invalid argument to 'alp-{tag}.{method}': {reason}")]
    InvalidArgument { tag: String, method: String, reason: String },

    /// An append that would put an element inside its own subtree, or move the root.
    #[error("Cannot append element {child} under element {parent}")]
    InvalidMove { parent: u64, child: u64 },

    /// No component descriptor for the tag.
    #[error("Unknown component '{0}'")]
    UnknownComponent(String),

    /// A component does not handle the invoked method.
    #[error("Component 'alp-{tag}' has no method '{method}'")]
    UnknownMethod { tag: String, method: String },

    /// The init hook failed; the instance never became ready.
    #[error("Component 'alp-{tag}' failed to initialize: {source}")]
    InitFailed {
        tag: String,
        #[source]
        source: Box<AlpError>,
    },

    /// The element was removed before (or while) its component was reachable.
    #[error("Element {0} was disconnected")]
    Detached(u64),

    /// The element id does not exist in the page.
    #[error("Element {0} not found")]
    ElementNotFound(u64),

    /// The owning `App` has been dropped.
    #[error("Application context is closed")]
    AppClosed,

    /// A storage engine failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AlpError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseNotFound { .. }
            | Self::StoreNotFound { .. }
            | Self::UnknownComponent(_)
            | Self::UnknownMethod { .. }
            | Self::ElementNotFound(_) => ErrorKind::NotFound,
            Self::DatabaseExists(_) | Self::StoreExists { .. } | Self::AlreadyDefined(_) => {
                ErrorKind::AlreadyExists
            }
            Self::InvalidName { .. }
            | Self::InvalidSelector(_)
            | Self::InvalidArgument { .. }
            | Self::InvalidMove { .. } => ErrorKind::InvalidInput,
            Self::InitFailed { .. } | Self::Detached(_) | Self::AppClosed => ErrorKind::Lifecycle,
            Self::Storage(_) | Self::Serialization(_) | Self::Config(_) => ErrorKind::Io,
        }
    }

    /// True for missing databases and stores (and other absent entities).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn invalid_name(name: &str, reason: &str) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
