//! Report types for REDCap sync runs.

use std::path::PathBuf;

use serde::Serialize;

use crate::snapshot::WriteOutcome;

/// What the orchestrator did for one (instance, record, project) target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    /// Snapshot exists and the trigger log shows no newer update.
    Skipped,
    /// REDCap returned `[]`: no data for this record in this project.
    Empty,
    /// De-identified study, but the project's dictionary marks every field
    /// as identifying. The record was not requested.
    NoSafeFields,
    /// First snapshot written.
    Created,
    /// Snapshot replaced; the previous version was moved to `backup`.
    Updated { backup: PathBuf },
    /// Re-downloaded, identical to the snapshot on disk.
    Unchanged,
    /// Downloaded but not written (dry run).
    DryRun,
}

impl From<WriteOutcome> for SyncAction {
    fn from(outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Created => Self::Created,
            WriteOutcome::Updated { backup } => Self::Updated { backup },
            WriteOutcome::Unchanged => Self::Unchanged,
            WriteOutcome::DryRun => Self::DryRun,
        }
    }
}

/// Outcome for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub instance: String,
    pub project: String,
    pub record_id: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub action: SyncAction,
}

/// Everything that happened while syncing one subject.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectReport {
    pub subject: String,
    pub study: String,
    pub deidentified: bool,
    pub targets: Vec<TargetReport>,
}

/// State of a snapshot as seen without contacting REDCap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotState {
    /// Never downloaded; the next sync will fetch it.
    Missing,
    /// The trigger log shows a newer update; the next sync will fetch it.
    Stale,
    /// Up to date as far as the trigger log knows.
    Current,
}

/// Snapshot state for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub instance: String,
    pub project: String,
    pub record_id: String,
    pub path: PathBuf,
    pub state: SnapshotState,
    /// Latest trigger-log timestamp for the record, if any
    pub last_trigger: Option<f64>,
}

/// Counts across a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub subjects: usize,
    pub skipped: usize,
    pub empty: usize,
    pub no_safe_fields: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub dry_run: usize,
}

impl SyncStats {
    /// Fold one subject's report into the totals.
    pub fn add(&mut self, report: &SubjectReport) {
        self.subjects += 1;
        for target in &report.targets {
            match target.action {
                SyncAction::Skipped => self.skipped += 1,
                SyncAction::Empty => self.empty += 1,
                SyncAction::NoSafeFields => self.no_safe_fields += 1,
                SyncAction::Created => self.created += 1,
                SyncAction::Updated { .. } => self.updated += 1,
                SyncAction::Unchanged => self.unchanged += 1,
                SyncAction::DryRun => self.dry_run += 1,
            }
        }
    }

    /// Targets that were downloaded from REDCap.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.empty + self.created + self.updated + self.unchanged + self.dry_run
    }

    /// Snapshots written to disk.
    #[must_use]
    pub fn written(&self) -> usize {
        self.created + self.updated
    }
}
