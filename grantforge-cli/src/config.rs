//! CLI configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use grantforge_core::TokenLifetimes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantforgeConfig {
    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Token lifetimes handed to the token store.
    #[serde(default)]
    pub lifetimes: TokenLifetimes,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GrantforgeConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            log_level: default_log_level(),
            lifetimes: TokenLifetimes::default(),
        }
    }
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<GrantforgeConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    let mut config: GrantforgeConfig = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        GrantforgeConfig::default()
    };

    config
        .lifetimes
        .validate()
        .with_context(|| format!("Invalid lifetimes in {:?}", config_path))?;
    config.config_path = config_path;

    Ok(config)
}

fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("grantforge.toml"))
        .unwrap_or_else(|| PathBuf::from("grantforge.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "grantforge")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.lifetimes, TokenLifetimes::default());
        assert_eq!(config.config_path, path);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grantforge.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\n\n[lifetimes]\naccess_secs = 120\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.lifetimes.access_secs, 120);
        assert_eq!(config.lifetimes.authorization_secs, 600);
    }

    #[test]
    fn test_zero_lifetime_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grantforge.toml");
        std::fs::write(&path, "[lifetimes]\nrefresh_secs = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("refresh"));
    }

    #[test]
    fn test_malformed_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grantforge.toml");
        std::fs::write(&path, "log_level = [").unwrap();

        assert!(load_config(Some(&path)).is_err());
    }
}
