//! Error types for redcap-sync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=keyring, 3=config, 4=fetch, etc.)
//! - Retryability flags used by the per-subject retry loop
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for redcap-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Keyring (exit 2)
    KeyringError,

    // Config (exit 3)
    ConfigError,
    InvalidArgument,

    // Fetch (exit 4)
    FetchError,
    IntegrityError,

    // I/O (exit 5)
    IoError,
    JsonError,
    CsvError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::KeyringError => "KEYRING_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FetchError => "FETCH_ERROR",
            Self::IntegrityError => "INTEGRITY_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::CsvError => "CSV_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-5).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::KeyringError => 2,
            Self::ConfigError | Self::InvalidArgument => 3,
            Self::FetchError | Self::IntegrityError => 4,
            Self::IoError | Self::JsonError | Self::CsvError => 5,
        }
    }

    /// Whether the failure is assumed transient.
    ///
    /// Only network-side failures qualify. Deployment misconfiguration and
    /// local disk problems will not fix themselves between attempts.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchError | Self::IntegrityError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while syncing REDCap records.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("redcap url {url} responded {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("content length {actual} does not match expected length {expected} for {context}")]
    LengthMismatch {
        actual: u64,
        expected: u64,
        context: String,
    },

    #[error("invalid content-length header {value:?} for {context}")]
    BadContentLength { value: String, context: String },

    #[error("IO error at {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Path { path, source }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Keyring(_) => ErrorCode::KeyringError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Status { .. } | Self::Transport { .. } => ErrorCode::FetchError,
            Self::LengthMismatch { .. } | Self::BadContentLength { .. } => {
                ErrorCode::IntegrityError
            }
            Self::Path { .. } => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Csv(_) => ErrorCode::CsvError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether the per-subject retry loop should try again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Keyring(msg) if msg.contains("API_TOKEN >") => Some(
                "Every project listed under lochness > REDCAP > <study> > <instance> \
                 needs a token under <instance> > API_TOKEN."
                    .to_string(),
            ),
            Self::Keyring(_) => Some(
                "Check the keyring file referenced by `keyring_file` in the config.".to_string(),
            ),
            Self::Config(_) => Some(
                "Pass --config <path> or set REDCAP_SYNC_CONFIG to a valid config.json."
                    .to_string(),
            ),
            Self::Status { status, .. } if *status == 403 => {
                Some("REDCap rejected the API token for this project.".to_string())
            }
            Self::LengthMismatch { .. } => {
                Some("The transfer was truncated; re-running the sync usually succeeds.".to_string())
            }
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
