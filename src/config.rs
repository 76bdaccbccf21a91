//! TOML configuration with compiled-in defaults.
//!
//! Resolution order: explicit `--config` path, then the `PRICESENTRY_CONFIG`
//! environment variable, then the standard filesystem location, then defaults.
//! CLI flags override individual fields after the file is loaded.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable naming an alternate config file path.
pub const CONFIG_ENV_VAR: &str = "PRICESENTRY_CONFIG";

/// Standard config location on a deployed host.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pricesentry/pricesentry.toml";

/// Root configuration for the daemon and CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API server bind address.
    pub bind: String,
    /// Path to the SQLite task store.
    pub db_path: String,
    /// Extraction endpoint the fetcher posts scrape jobs to.
    pub extractor_url: String,
    /// Per-request timeout for extraction calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            db_path: "data/pricesentry.db".to_string(),
            extractor_url: "http://127.0.0.1:3000/api/extract-div".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration from the standard locations.
    ///
    /// An explicit path is authoritative and load failures are returned to the
    /// caller. The env var and standard path fall back to defaults with a
    /// warning, so a missing file never stops the daemon.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config from env var unusable, trying defaults");
                }
            }
        }

        let standard = Path::new(DEFAULT_CONFIG_PATH);
        if standard.exists() {
            match Self::load(standard) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(path = %standard.display(), error = %e, "standard config unusable, using defaults");
                }
            }
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let cfg = Config::default();
        assert!(cfg.bind.contains(':'));
        assert!(cfg.extractor_url.starts_with("http"));
        assert_eq!(cfg.request_timeout_secs, 30);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let cfg: Config = toml::from_str(r#"bind = "127.0.0.1:9999""#).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:9999");
        assert_eq!(cfg.db_path, Config::default().db_path);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/pricesentry.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
