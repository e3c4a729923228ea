//! Project naming for snapshot files.
//!
//! REDCap project names are free text ("Baseline Visit (v2)"). Snapshot file
//! names must be stable and filesystem safe, so every run of non-word
//! characters collapses to a single underscore.

/// Collapse every run of non-word characters in a trimmed project name to `_`.
///
/// Word characters are Unicode alphanumerics and `_`.
#[must_use]
pub fn sanitize_project_name(project: &str) -> String {
    let mut out = String::with_capacity(project.len());
    let mut in_run = false;
    for c in project.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// File name of the snapshot for one instance-subject id in one project.
#[must_use]
pub fn snapshot_file_name(instance_subject_id: &str, project: &str) -> String {
    format!("{instance_subject_id}.{}.json", sanitize_project_name(project))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_name() {
        assert_eq!(sanitize_project_name("intake"), "intake");
        assert_eq!(sanitize_project_name("intake_v2"), "intake_v2");
    }

    #[test]
    fn test_sanitize_collapses_runs() {
        assert_eq!(sanitize_project_name("Baseline Visit (v2)"), "Baseline_Visit_v2_");
        assert_eq!(sanitize_project_name("a -- b"), "a_b");
    }

    #[test]
    fn test_sanitize_trims_first() {
        assert_eq!(sanitize_project_name("  intake  "), "intake");
    }

    #[test]
    fn test_sanitize_keeps_unicode_letters() {
        assert_eq!(sanitize_project_name("Étude 1"), "Étude_1");
    }

    #[test]
    fn test_snapshot_file_name() {
        assert_eq!(snapshot_file_name("S1", "Baseline Visit"), "S1.Baseline_Visit.json");
    }
}
