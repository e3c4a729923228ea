//! REDCap record synchronization.
//!
//! - **Client**: integrity-checked form POSTs to `/api/`
//! - **Metadata**: data-dictionary driven de-identification
//! - **Trigger**: data entry trigger log, the cheap staleness oracle
//! - **Retry**: bounded, jittered retries around a whole subject
//! - **Sync**: the per-subject orchestrator tying it all together
//!
//! # Example
//!
//! ```ignore
//! use redcap_sync::redcap::{RedcapClient, Syncer, TriggerLog};
//!
//! let log = TriggerLog::load(config.redcap.data_entry_trigger_csv.as_deref())?;
//! let client = RedcapClient::new(&config.redcap)?;
//! let syncer = Syncer::new(client, &keyring, &config.redcap, &log);
//! let report = syncer.sync(&subject).await?;
//! ```

mod client;
mod metadata;
mod retry;
mod sync;
mod trigger;
mod types;

pub use client::{metadata_query, record_query, verify_content_length, Query, RedcapClient};
pub use metadata::{
    deidentified_fields, fields_param, non_identifying_fields, parse_metadata, FieldMetadata,
};
pub use retry::{retry, RetryPolicy};
pub use sync::{is_empty_result, snapshot_status, Syncer};
pub use trigger::{is_newer, mtime_secs, now_secs, set_mtime_secs, TriggerLog};
pub use types::{
    SnapshotState, SubjectReport, SyncAction, SyncStats, TargetReport, TargetStatus,
};
