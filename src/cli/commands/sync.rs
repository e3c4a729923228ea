//! Sync command implementation.
//!
//! Loads config, keyring, and the data entry trigger log once, then syncs
//! the selected subjects one after another. The first fatal error stops the
//! run; snapshots already written are kept.

use colored::Colorize;

use crate::cli::SubjectArgs;
use crate::config::load_config;
use crate::error::{Error, Result};
use crate::redcap::{RedcapClient, SubjectReport, SyncAction, SyncStats, Syncer, TriggerLog};

use super::select_subjects;

/// Execute the sync command.
///
/// # Errors
///
/// Returns configuration, keyring, and exhausted-retry fetch errors.
pub fn execute(
    args: &SubjectArgs,
    config_path: Option<&std::path::Path>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let keyring = config.load_keyring()?;
    let subjects = select_subjects(args)?;
    let trigger_log = TriggerLog::load(config.redcap.data_entry_trigger_csv.as_deref())?
        .with_clock_skew(config.redcap.clock_skew_secs);
    let client = RedcapClient::new(&config.redcap)?;
    let syncer = Syncer::new(client, &keyring, &config.redcap, &trigger_log).dry_run(dry_run);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Other(format!("Failed to create runtime: {e}")))?;

    let mut stats = SyncStats::default();
    let mut reports = Vec::with_capacity(subjects.len());
    for subject in &subjects {
        let report = rt.block_on(syncer.sync(subject))?;
        stats.add(&report);
        if !json {
            print_report(&report);
        }
        reports.push(report);
    }

    if json {
        let output = serde_json::json!({
            "success": true,
            "dry_run": dry_run,
            "stats": stats,
            "subjects": reports,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_summary(&stats, dry_run);
    }
    Ok(())
}

fn print_report(report: &SubjectReport) {
    if report.targets.is_empty() {
        println!(
            "{} {}",
            format!("{}/{}", report.study, report.subject).bold(),
            "no REDCap projects".dimmed()
        );
        return;
    }

    println!("{}", format!("{}/{}", report.study, report.subject).bold());
    for target in &report.targets {
        let label = match &target.action {
            SyncAction::Skipped => "skipped".dimmed(),
            SyncAction::Empty => "no data".yellow(),
            SyncAction::NoSafeFields => "withheld".red(),
            SyncAction::Created => "created".green(),
            SyncAction::Updated { .. } => "updated".green().bold(),
            SyncAction::Unchanged => "unchanged".normal(),
            SyncAction::DryRun => "fetched (dry run)".cyan(),
        };
        println!(
            "  {:<10} {} {} {}",
            label,
            target.instance,
            target.project,
            target.record_id.dimmed()
        );
    }
}

fn print_summary(stats: &SyncStats, dry_run: bool) {
    println!();
    if dry_run {
        println!("{}", "Dry run: no snapshots were written".yellow());
    }
    println!(
        "{} subjects, {} fetched, {} written, {} skipped, {} empty",
        stats.subjects,
        stats.fetched(),
        stats.written(),
        stats.skipped,
        stats.empty
    );
    if stats.no_safe_fields > 0 {
        println!(
            "{}",
            format!(
                "{} target(s) withheld: de-identified study with no non-identifying fields",
                stats.no_safe_fields
            )
            .red()
        );
    }
}
