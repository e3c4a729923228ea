//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Synchronize REDCap records into per-subject JSON snapshots
#[derive(Parser, Debug)]
#[command(name = "redcap-sync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.redcap-sync/config.json)
    #[arg(long, global = true, env = "REDCAP_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Download records but do not write snapshots
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download changed REDCap records for the selected subjects
    Sync(SubjectArgs),

    /// Show which snapshots are missing or stale, without contacting REDCap
    Status(SubjectArgs),

    /// List the REDCap projects a study syncs from an instance
    Projects {
        /// Study name
        #[arg(long)]
        study: String,

        /// REDCap instance name as it appears in the keyring
        #[arg(long)]
        instance: String,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Subject selection shared by `sync` and `status`.
#[derive(Args, Debug, Clone)]
pub struct SubjectArgs {
    /// JSON manifest listing subjects
    #[arg(long, env = "REDCAP_SYNC_SUBJECTS")]
    pub subjects: PathBuf,

    /// Only subjects of this study
    #[arg(long)]
    pub study: Option<String>,

    /// Only these subject ids (repeatable)
    #[arg(long = "subject")]
    pub subject_ids: Vec<String>,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
