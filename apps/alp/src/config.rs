//! # Configuration Loading
//!
//! Precedence, lowest first:
//!
//! 1. `AlpConfig::default()`
//! 2. the TOML file (`--config`, or `alp.toml` when it exists)
//! 3. `ALP_DATA_DIR` / `ALP_PERSISTENCE`
//! 4. `--data-dir` / `--memory`
//!
//! ```toml
//! data_dir = "/var/lib/alp"
//! default_db = "AlpDB"
//! default_store = "alp"
//! persistence = "redb"
//! ```

use alp_core::{AlpConfig, AlpError, Persistence};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "alp.toml";

/// Data directory used when nothing else names one.
pub const DEFAULT_DATA_DIR: &str = "alp-data";

/// Environment variable overriding `data_dir`.
pub const ENV_DATA_DIR: &str = "ALP_DATA_DIR";

/// Environment variable overriding `persistence`.
pub const ENV_PERSISTENCE: &str = "ALP_PERSISTENCE";

/// Values taken from command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub memory: bool,
}

/// Parse a TOML document into a config. Missing keys keep their defaults.
pub fn parse(text: &str) -> Result<AlpConfig, AlpError> {
    toml::from_str(text).map_err(|e| AlpError::Config(e.to_string()))
}

/// Read a config file.
pub fn load_file(path: &Path) -> Result<AlpConfig, AlpError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AlpError::Config(format!("Cannot read '{}': {}", path.display(), e)))?;
    parse(&text)
}

/// Apply `ALP_*` variables through `lookup`.
pub fn apply_env<F>(mut config: AlpConfig, lookup: F) -> Result<AlpConfig, AlpError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
        config.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(mode) = lookup(ENV_PERSISTENCE) {
        config.persistence = mode.parse()?;
    }
    Ok(config)
}

/// Apply command-line flags.
#[must_use]
pub fn apply_overrides(mut config: AlpConfig, overrides: &Overrides) -> AlpConfig {
    if let Some(dir) = &overrides.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if overrides.memory {
        config.persistence = Persistence::Memory;
    }
    if config.data_dir.is_none() && config.persistence != Persistence::Memory {
        config.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
    }
    config
}

/// Resolve the effective config from file, environment and flags.
///
/// An explicit `--config` must exist; the implicit `alp.toml` is optional.
pub fn resolve<F>(overrides: &Overrides, lookup: F) -> Result<AlpConfig, AlpError>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match &overrides.config {
        Some(path) => load_file(path)?,
        None => {
            let implicit = Path::new(DEFAULT_CONFIG_FILE);
            if implicit.is_file() {
                load_file(implicit)?
            } else {
                AlpConfig::default()
            }
        }
    };
    let config = apply_overrides(apply_env(base, lookup)?, overrides);
    config.validate()?;
    Ok(config)
}

/// `resolve` against the process environment.
pub fn from_process_env(overrides: &Overrides) -> Result<AlpConfig, AlpError> {
    resolve(overrides, |key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse("default_db = \"Work\"").expect("parse");
        assert_eq!(config.default_db, "Work");
        assert_eq!(config.default_store, "alp");
        assert_eq!(config.persistence, Persistence::Auto);
    }

    #[test]
    fn unknown_persistence_is_a_config_error() {
        let err = parse("persistence = \"cloud\"").expect_err("bad mode");
        assert!(matches!(err, AlpError::Config(_)));
    }

    #[test]
    fn env_overrides_file() {
        let base = parse("data_dir = \"/from/file\"").expect("parse");
        let config = apply_env(base, |key| match key {
            ENV_DATA_DIR => Some("/from/env".to_string()),
            ENV_PERSISTENCE => Some("memory".to_string()),
            _ => None,
        })
        .expect("env");
        assert_eq!(config.data_dir, Some(PathBuf::from("/from/env")));
        assert_eq!(config.persistence, Persistence::Memory);
    }

    #[test]
    fn flags_override_env() {
        let from_env = apply_env(AlpConfig::default(), |key| {
            (key == ENV_DATA_DIR).then(|| "/from/env".to_string())
        })
        .expect("env");
        let overrides = Overrides {
            data_dir: Some(PathBuf::from("/from/flag")),
            ..Overrides::default()
        };
        let config = apply_overrides(from_env, &overrides);
        assert_eq!(config.data_dir, Some(PathBuf::from("/from/flag")));
    }

    #[test]
    fn data_dir_defaults_unless_memory() {
        let config = apply_overrides(AlpConfig::default(), &Overrides::default());
        assert_eq!(config.data_dir, Some(PathBuf::from(DEFAULT_DATA_DIR)));

        let memory = Overrides {
            memory: true,
            ..Overrides::default()
        };
        let config = apply_overrides(AlpConfig::default(), &memory);
        assert_eq!(config.data_dir, None);
        assert_eq!(config.persistence, Persistence::Memory);
    }

    #[test]
    fn explicit_missing_file_fails() {
        let overrides = Overrides {
            config: Some(PathBuf::from("/definitely/not/here/alp.toml")),
            ..Overrides::default()
        };
        let err = resolve(&overrides, no_env).expect_err("missing file");
        assert!(err.to_string().contains("Cannot read"));
    }
}
