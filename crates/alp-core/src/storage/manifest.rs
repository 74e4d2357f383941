//! # Schema Manifest
//!
//! Each redb-backed database records its schema in the reserved
//! `__alp_manifest` table so that stores survive a reopen.
//!
//! Format: Header (5 bytes) + postcard-serialized manifest.
//! - 4 bytes: Magic ("ALPM")
//! - 1 byte: Format version

use crate::AlpError;
use crate::primitives::{MANIFEST_FORMAT_VERSION, MANIFEST_MAGIC};
use serde::{Deserialize, Serialize};

/// Length of the magic + version header.
const HEADER_LEN: usize = 5;

/// The append-only schema of one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaManifest {
    /// Bumped by exactly one per added store; starts at 1.
    pub version: u64,
    /// Store names in creation order.
    pub stores: Vec<String>,
}

impl SchemaManifest {
    /// Initial manifest for a freshly created database.
    #[must_use]
    pub fn initial(stores: Vec<String>) -> Self {
        Self { version: 1, stores }
    }

    /// Whether the schema contains `store`.
    #[must_use]
    pub fn has_store(&self, store: &str) -> bool {
        self.stores.iter().any(|s| s == store)
    }

    /// Append `store` and bump the version. Returns false if already present.
    pub fn add_store(&mut self, store: &str) -> bool {
        if self.has_store(store) {
            return false;
        }
        self.stores.push(store.to_string());
        self.version = self.version.saturating_add(1);
        true
    }

    /// Encode header + payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AlpError> {
        let payload =
            postcard::to_stdvec(self).map_err(|e| AlpError::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MANIFEST_MAGIC);
        bytes.push(MANIFEST_FORMAT_VERSION);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Validate the header and decode the payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AlpError> {
        if bytes.len() < HEADER_LEN {
            return Err(AlpError::Serialization("Manifest too short".to_string()));
        }
        if &bytes[0..4] != MANIFEST_MAGIC {
            return Err(AlpError::Serialization(
                "Invalid manifest magic bytes".to_string(),
            ));
        }
        if bytes[4] != MANIFEST_FORMAT_VERSION {
            return Err(AlpError::Serialization(format!(
                "Unsupported manifest version: {} (expected {})",
                bytes[4], MANIFEST_FORMAT_VERSION
            )));
        }
        postcard::from_bytes(&bytes[HEADER_LEN..])
            .map_err(|e| AlpError::Serialization(e.to_string()))
    }
}
