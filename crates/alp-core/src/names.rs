//! Name rules for databases and stores.
//!
//! A database name is also a file stem, and both names are path segments, so
//! neither may contain the structural characters the path codec splits on.

use crate::AlpError;
use crate::primitives::MANIFEST_TABLE;

/// Check a database name.
pub fn validate_db_name(name: &str) -> Result<(), AlpError> {
    validate_segment(name)?;
    if name.contains('\\') {
        return Err(AlpError::invalid_name(name, "contains '\\'"));
    }
    if name == "." || name == ".." {
        return Err(AlpError::invalid_name(name, "reserved file name"));
    }
    Ok(())
}

/// Check a store name.
pub fn validate_store_name(name: &str) -> Result<(), AlpError> {
    validate_segment(name)?;
    if name == MANIFEST_TABLE {
        return Err(AlpError::invalid_name(name, "reserved table name"));
    }
    Ok(())
}

fn validate_segment(name: &str) -> Result<(), AlpError> {
    if name.trim().is_empty() {
        return Err(AlpError::invalid_name(name, "empty"));
    }
    if name.trim() != name {
        return Err(AlpError::invalid_name(name, "surrounding whitespace"));
    }
    if let Some(c) = name.chars().find(|c| matches!(c, '/' | ':')) {
        return Err(AlpError::invalid_name(name, &format!("contains '{c}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass() {
        assert!(validate_db_name("Work").is_ok());
        assert!(validate_store_name("data").is_ok());
        assert!(validate_store_name("bills.2024").is_ok());
    }

    #[test]
    fn structural_characters_fail() {
        assert!(validate_db_name("a/b").is_err());
        assert!(validate_db_name("a:b").is_err());
        assert!(validate_store_name("x:y").is_err());
        assert!(validate_store_name("x/y").is_err());
    }

    #[test]
    fn file_hostile_db_names_fail() {
        assert!(validate_db_name("..").is_err());
        assert!(validate_db_name("a\\b").is_err());
        assert!(validate_db_name("").is_err());
        assert!(validate_db_name(" padded").is_err());
    }

    #[test]
    fn manifest_table_is_reserved() {
        assert!(validate_store_name(MANIFEST_TABLE).is_err());
    }
}
