//! # Innate Primitives
//!
//! Fixed names and limits shared by every Alp component.
//!
//! An `App` starts with one database and one store whose names come from
//! configuration; everything else here is compiled in and immutable at runtime.

/// Database used when a path omits the `db/` segment.
pub const DEFAULT_DB: &str = "AlpDB";

/// Store used when a path omits the `store:` segment.
pub const DEFAULT_STORE: &str = "alp";

/// Every component tag is `alp-<suffix>`.
pub const COMPONENT_PREFIX: &str = "alp-";

/// A component's default path is `alp.<suffix>`.
pub const DEFAULT_PATH_NAMESPACE: &str = "alp";

/// Host attribute that overrides the component's default path.
pub const PATH_ATTRIBUTE: &str = "path";

/// Expression handed to templates naming where the current path lives.
pub const PATH_EXPR: &str = "path";

/// Attribute prefix marking an event binding in markup (`@click="save()"`).
pub const EVENT_BINDING_PREFIX: char = '@';

// =============================================================================
// STORAGE LAYOUT
// =============================================================================

/// File extension of a redb-backed database inside the data directory.
pub const DB_FILE_EXTENSION: &str = "redb";

/// Reserved table holding the schema manifest of each database.
pub const MANIFEST_TABLE: &str = "__alp_manifest";

/// Key of the manifest row inside [`MANIFEST_TABLE`].
pub const MANIFEST_KEY: &str = "schema";

/// Magic bytes prefixed to an encoded manifest.
pub const MANIFEST_MAGIC: &[u8; 4] = b"ALPM";

/// Current manifest encoding version.
///
/// Increment this when making breaking changes to the manifest layout.
pub const MANIFEST_FORMAT_VERSION: u8 = 1;

/// Name of the throwaway file written to check a data directory is writable.
pub const WRITE_CHECK_FILE: &str = ".alp-write-check";

/// Build the default path of a component with the given tag suffix.
#[must_use]
pub fn default_component_path(suffix: &str) -> String {
    format!("{DEFAULT_PATH_NAMESPACE}.{suffix}")
}

/// Build the element tag of a component with the given tag suffix.
#[must_use]
pub fn component_tag(suffix: &str) -> String {
    format!("{COMPONENT_PREFIX}{suffix}")
}
