//! Settings for the ingestion CLI.
//!
//! Resolution order (later wins):
//! 1. built-in defaults ([`Settings::default`])
//! 2. an optional TOML file
//! 3. environment variables `DATABASE_URL` and `KPI_INGEST_LOG`
//!
//! ```toml
//! database_url = "kpi.db"
//! log_filter = "kpi_ingest=debug"
//! default_user = "ops@fund.example"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::env::get_env_var_opt;

/// Env var holding the database location.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Env var holding the tracing filter directive.
pub const LOG_FILTER_VAR: &str = "KPI_INGEST_LOG";

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file {}", path.display())]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`Settings`].
    #[error("invalid settings file {}: {source}", path.display())]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Effective runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// SQLite database path. `None` means "must be given on the command line".
    pub database_url: Option<String>,
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
    /// User id recorded as `created_by` when none is passed explicitly.
    pub default_user: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            log_filter: "info".to_string(),
            default_user: None,
        }
    }
}

impl Settings {
    /// Parse settings from a TOML string (no env overrides applied).
    pub fn from_toml_str(s: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    fn apply_env(mut self) -> Self {
        if let Some(url) = get_env_var_opt(DATABASE_URL_VAR) {
            self.database_url = Some(url);
        }
        if let Some(filter) = get_env_var_opt(LOG_FILTER_VAR) {
            self.log_filter = filter;
        }
        self
    }
}

/// Load settings from an optional file, then apply env overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let base = match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                path: p.to_path_buf(),
                source,
            })?;
            Settings::from_toml_str(&raw, p)?
        }
        None => Settings::default(),
    };
    Ok(base.apply_env())
}
