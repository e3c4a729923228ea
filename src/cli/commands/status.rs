//! Status command implementation.
//!
//! Answers "what would the next sync download?" from local state alone: the
//! snapshots on disk and the data entry trigger log.

use colored::Colorize;
use serde::Serialize;

use crate::cli::SubjectArgs;
use crate::config::load_config;
use crate::error::Result;
use crate::redcap::{snapshot_status, SnapshotState, TargetStatus, TriggerLog};

use super::select_subjects;

#[derive(Serialize)]
struct SubjectStatus<'a> {
    subject: &'a str,
    study: &'a str,
    targets: Vec<TargetStatus>,
}

/// Execute the status command.
///
/// # Errors
///
/// Returns configuration, keyring, and I/O errors.
pub fn execute(args: &SubjectArgs, config_path: Option<&std::path::Path>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let keyring = config.load_keyring()?;
    let subjects = select_subjects(args)?;
    let trigger_log = TriggerLog::load(config.redcap.data_entry_trigger_csv.as_deref())?
        .with_clock_skew(config.redcap.clock_skew_secs);

    let mut all = Vec::with_capacity(subjects.len());
    for subject in &subjects {
        all.push(SubjectStatus {
            subject: &subject.id,
            study: &subject.study,
            targets: snapshot_status(&keyring, &trigger_log, subject)?,
        });
    }

    if json {
        println!("{}", serde_json::to_string(&all)?);
        return Ok(());
    }

    let mut pending = 0;
    for status in &all {
        println!("{}", format!("{}/{}", status.study, status.subject).bold());
        for target in &status.targets {
            let label = match target.state {
                SnapshotState::Missing => "missing".red(),
                SnapshotState::Stale => "stale".yellow(),
                SnapshotState::Current => "current".green(),
            };
            if target.state != SnapshotState::Current {
                pending += 1;
            }
            println!(
                "  {:<8} {} {} {}",
                label,
                target.instance,
                target.project,
                target.path.display().to_string().dimmed()
            );
        }
    }
    println!();
    println!("{pending} snapshot(s) would be downloaded by the next sync");
    Ok(())
}
