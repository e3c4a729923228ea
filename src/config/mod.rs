//! Configuration management.
//!
//! Settings live in a single JSON file:
//!
//! ```json
//! {
//!   "keyring_file": "keyring.json",
//!   "redcap": {
//!     "data_entry_trigger_csv": "det.csv",
//!     "verify_tls": true,
//!     "timeout_secs": 60,
//!     "max_attempts": 5,
//!     "StudyA": { "deidentify": true }
//!   }
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the config
//! file. Study sections sit beside the reserved `redcap` keys.

mod keyring;

pub use keyring::{api_url, Keyring, ProjectRef, API_PATH};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "REDCAP_SYNC_CONFIG";

/// Top-level configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// JSON keyring holding REDCap URLs and API tokens
    pub keyring_file: Option<PathBuf>,

    #[serde(default)]
    pub redcap: RedcapSettings,
}

/// The `redcap` section of the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedcapSettings {
    /// CSV written by the REDCap data entry trigger listener
    pub data_entry_trigger_csv: Option<PathBuf>,

    /// Verify the REDCap server's TLS certificate
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per subject before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Tolerance subtracted from a snapshot's mtime before comparing it to
    /// trigger-log timestamps
    #[serde(default)]
    pub clock_skew_secs: f64,

    /// Per-study settings, keyed by study name
    #[serde(flatten)]
    pub studies: BTreeMap<String, serde_json::Value>,
}

fn default_verify_tls() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for RedcapSettings {
    fn default() -> Self {
        Self {
            data_entry_trigger_csv: None,
            verify_tls: default_verify_tls(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            clock_skew_secs: 0.0,
            studies: BTreeMap::new(),
        }
    }
}

impl RedcapSettings {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether records for `study` must be de-identified.
    ///
    /// Reads `redcap.<study>.deidentify`. Anything other than a JSON boolean,
    /// including a missing value, counts as `false`.
    #[must_use]
    pub fn deidentify(&self, study: &str) -> bool {
        self.studies
            .get(study)
            .and_then(|s| s.get("deidentify"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

impl Config {
    /// Parse a config from JSON, resolving relative paths against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns a config error if the JSON is malformed.
    pub fn from_json(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))?;

        if let Some(path) = config.keyring_file.take() {
            config.keyring_file = Some(base_dir.join(path));
        }
        if let Some(path) = config.redcap.data_entry_trigger_csv.take() {
            config.redcap.data_entry_trigger_csv = Some(base_dir.join(path));
        }
        if config.redcap.max_attempts == 0 {
            return Err(Error::Config("redcap.max_attempts must be at least 1".into()));
        }
        Ok(config)
    }

    /// Load the keyring named by `keyring_file`.
    ///
    /// # Errors
    ///
    /// Returns a config error if no keyring is configured, or a keyring error
    /// if it cannot be loaded.
    pub fn load_keyring(&self) -> Result<Keyring> {
        let path = self
            .keyring_file
            .as_deref()
            .ok_or_else(|| Error::Config("keyring_file is not set".into()))?;
        Keyring::load(path)
    }
}

/// Default config file location: `~/.redcap-sync/config.json`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".redcap-sync").join("config.json"))
}

/// Load configuration.
///
/// Priority:
/// 1. `explicit_path` (from `--config` or `REDCAP_SYNC_CONFIG`); must exist
/// 2. `~/.redcap-sync/config.json`; defaults if absent
///
/// # Errors
///
/// Returns a config error if an explicit file is missing, or any config
/// file is unreadable or malformed.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    let path = match explicit_path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    Config::from_json(&content, base_dir)
}
