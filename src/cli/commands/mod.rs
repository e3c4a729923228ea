//! Command implementations.

pub mod completions;
pub mod projects;
pub mod status;
pub mod sync;
pub mod version;

use crate::cli::SubjectArgs;
use crate::error::{Error, Result};
use crate::model::{load_manifest, Subject};

/// Load the manifest and apply `--study` / `--subject` filters.
///
/// Naming a subject id that is not in the manifest is an error, so typos
/// do not silently sync nothing.
pub(crate) fn select_subjects(args: &SubjectArgs) -> Result<Vec<Subject>> {
    let subjects = load_manifest(&args.subjects)?;

    for id in &args.subject_ids {
        if !subjects.iter().any(|s| &s.id == id) {
            return Err(Error::InvalidArgument(format!(
                "subject {id} is not in {}",
                args.subjects.display()
            )));
        }
    }

    Ok(subjects
        .into_iter()
        .filter(|s| args.study.as_ref().is_none_or(|study| &s.study == study))
        .filter(|s| args.subject_ids.is_empty() || args.subject_ids.contains(&s.id))
        .collect())
}
