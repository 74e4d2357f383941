//! # Configuration
//!
//! `AlpConfig` is the only input `App::new` needs. The binary fills it from
//! `alp.toml`, `ALP_*` environment variables and CLI flags; tests build it
//! directly.

use crate::primitives::{DEFAULT_DB, DEFAULT_STORE};
use crate::{AlpError, names};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Which storage backend the `StoreManager` should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// redb when `data_dir` is usable, memory otherwise.
    #[default]
    Auto,
    /// Always in-memory; nothing survives the process.
    Memory,
    /// Always redb; an unusable `data_dir` is an error.
    Redb,
}

impl FromStr for Persistence {
    type Err = AlpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "memory" | "mem" => Ok(Self::Memory),
            "redb" | "disk" => Ok(Self::Redb),
            other => Err(AlpError::Config(format!(
                "unknown persistence mode '{other}' (expected auto, memory or redb)"
            ))),
        }
    }
}

/// Runtime configuration of an Alp application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlpConfig {
    /// Directory holding one `<db>.redb` file per database.
    pub data_dir: Option<PathBuf>,
    /// Database used when a path has no `db/` segment.
    pub default_db: String,
    /// Store used when a path has no `store:` segment.
    pub default_store: String,
    /// Backend selection policy.
    pub persistence: Persistence,
}

impl Default for AlpConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_db: DEFAULT_DB.to_string(),
            default_store: DEFAULT_STORE.to_string(),
            persistence: Persistence::Auto,
        }
    }
}

impl AlpConfig {
    /// A configuration that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            persistence: Persistence::Memory,
            ..Self::default()
        }
    }

    /// A redb-backed configuration rooted at `dir`.
    #[must_use]
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            persistence: Persistence::Redb,
            ..Self::default()
        }
    }

    /// Reject default names that a path could not address.
    pub fn validate(&self) -> Result<(), AlpError> {
        names::validate_db_name(&self.default_db)
            .map_err(|e| AlpError::Config(format!("default_db: {e}")))?;
        names::validate_store_name(&self.default_store)
            .map_err(|e| AlpError::Config(format!("default_store: {e}")))?;
        if self.persistence == Persistence::Redb && self.data_dir.is_none() {
            return Err(AlpError::Config(
                "persistence = \"redb\" requires data_dir".to_string(),
            ));
        }
        Ok(())
    }
}
