//! redcap-sync - REDCap records as per-subject JSON snapshots
//!
//! Downloads each tracked subject's REDCap record, one JSON file per project,
//! and only when the data entry trigger log says something changed.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Configuration file and keyring access
//! - [`model`] - Subjects and snapshot naming
//! - [`redcap`] - API client, change detection, de-identification, sync
//! - [`snapshot`] - Atomic writes, hashing, backups
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod redcap;
pub mod snapshot;

pub use error::{Error, Result};
