//! Data models for redcap-sync.
//!
//! - Subject: a tracked participant and its per-instance REDCap ids
//! - Project naming: how REDCap project names map onto snapshot file names

pub mod project;
pub mod subject;

pub use project::{sanitize_project_name, snapshot_file_name};
pub use subject::{load_manifest, Subject};
