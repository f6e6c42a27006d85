//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating the paths a
//! container needs (blob, index, key) from JSON files and environment
//! variables.
//!
//! ## Environment Variables
//!
//! - `PAKET_CONTAINER`: Override container blob path
//! - `PAKET_INDEX`: Override index file path
//! - `PAKET_KEY_PATH`: Override key file path
//! - `PAKET_CONFIG`: Override config file path

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable names for configuration overrides
pub const ENV_CONTAINER_PATH: &str = "PAKET_CONTAINER";
pub const ENV_INDEX_PATH: &str = "PAKET_INDEX";
pub const ENV_KEY_PATH: &str = "PAKET_KEY_PATH";
pub const ENV_CONFIG_PATH: &str = "PAKET_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "paket.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub container_path: String,
    pub index_path: String,
    pub key_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            container_path: "./data.pkt".to_string(),
            index_path: "./data.index.json".to_string(),
            key_path: "./paket.key".to_string(),
        }
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self> {
        let s =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config =
            serde_json::from_str(&s).with_context(|| format!("parsing config file {}", path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file location: explicit path, else `PAKET_CONFIG`, else `paket.json`
    pub fn resolve_path(path: Option<&str>) -> String {
        path.map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                info!(path = p, "loading config from file");
                let s = fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p))?;
                serde_json::from_str(&s)
                    .with_context(|| format!("parsing config file {}", p))?
            }
            _ => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(container_path) = env::var(ENV_CONTAINER_PATH) {
            debug!(container_path = %container_path, "overriding container_path from environment");
            self.container_path = container_path;
        }

        if let Ok(index_path) = env::var(ENV_INDEX_PATH) {
            debug!(index_path = %index_path, "overriding index_path from environment");
            self.index_path = index_path;
        }

        if let Ok(key_path) = env::var(ENV_KEY_PATH) {
            debug!(key_path = %key_path, "overriding key_path from environment");
            self.key_path = key_path;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("container_path", &self.container_path),
            ("index_path", &self.index_path),
            ("key_path", &self.key_path),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", field);
            }
        }

        if self.container_path == self.index_path {
            anyhow::bail!("container_path and index_path must differ");
        }

        let key_path = Path::new(&self.key_path);
        if let Some(parent) = key_path.parent() {
            let parent_str = parent.to_string_lossy().to_lowercase();
            if parent_str.contains("public")
                || parent_str.contains("www")
                || parent_str.contains("htdocs")
            {
                warn!(
                    path = %self.key_path,
                    "key file path appears to be in a public directory - this is a security risk"
                );
            }
        }

        if self.key_path.contains("..") {
            warn!("key_path contains '..' - consider using absolute paths");
        }

        Ok(())
    }

    pub fn new(
        container_path: impl Into<String>,
        index_path: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        Self {
            container_path: container_path.into(),
            index_path: index_path.into(),
            key_path: key_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_rejects_empty_paths() {
        assert!(Config::new("", "i.json", "k").validate().is_err());
        assert!(Config::new("c.pkt", " ", "k").validate().is_err());
        assert!(Config::new("c.pkt", "i.json", "").validate().is_err());
        assert!(Config::new("same", "same", "k").validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        let cfg = Config::new("blob.pkt", "blob.index.json", "blob.key");
        fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();

        let loaded = Config::load(path.to_str().unwrap()).unwrap();
        if env::var(ENV_CONTAINER_PATH).is_err() {
            assert_eq!(loaded.container_path, "blob.pkt");
        }
        assert!(Config::load(tmp.path().join("missing.json").to_str().unwrap()).is_err());
    }

    #[test]
    fn test_load_with_env_priority() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("env.json");
        let cfg = Config::new("file.pkt", "file.index.json", "file.key");
        fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();

        env::set_var(ENV_CONFIG_PATH, &path);
        env::set_var(ENV_INDEX_PATH, "env.index.json");

        assert_eq!(Config::resolve_path(None), path.to_string_lossy());
        assert_eq!(Config::resolve_path(Some("explicit.json")), "explicit.json");

        // File found through PAKET_CONFIG, index overridden by the environment
        let loaded = Config::load_with_env(None).unwrap();
        assert_eq!(loaded.key_path, "file.key");
        assert_eq!(loaded.index_path, "env.index.json");

        // Missing file falls back to defaults, env still wins
        let missing = tmp.path().join("missing.json");
        let fallback = Config::load_with_env(missing.to_str()).unwrap();
        assert_eq!(fallback.key_path, Config::default().key_path);
        assert_eq!(fallback.index_path, "env.index.json");

        env::remove_var(ENV_INDEX_PATH);
        env::remove_var(ENV_CONFIG_PATH);

        fs::write(&path, "{ broken").unwrap();
        let err = Config::load_with_env(path.to_str()).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config file"));
    }
}
