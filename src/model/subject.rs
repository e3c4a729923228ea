//! Subject model.
//!
//! A subject is owned by the wider pipeline; this crate only reads it. The
//! same participant can be enrolled in several REDCap instances under
//! different record ids, so ids are kept per instance.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sub-directory of the protected folder that holds REDCap snapshots.
pub const SURVEYS_DIR: &str = "surveys";

/// A tracked research subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    /// Pipeline-wide subject identifier
    pub id: String,

    /// Owning study
    pub study: String,

    /// Root of this subject's protected (identifiable) storage
    pub protected_folder: PathBuf,

    /// REDCap instance name -> that instance's record ids for this subject
    #[serde(default)]
    pub redcap: BTreeMap<String, Vec<String>>,
}

impl Subject {
    /// Directory snapshots for this subject are written to.
    #[must_use]
    pub fn surveys_dir(&self) -> PathBuf {
        self.protected_folder.join(SURVEYS_DIR)
    }

    /// Iterate `(instance, instance-subject-id)` pairs.
    ///
    /// Instances come out in name order, ids in manifest order.
    pub fn redcap_ids(&self) -> impl Iterator<Item = (&str, &str)> {
        self.redcap.iter().flat_map(|(instance, ids)| {
            ids.iter().map(move |id| (instance.as_str(), id.as_str()))
        })
    }
}

/// Load a JSON subject manifest (an array of [`Subject`]).
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid manifest.
pub fn load_manifest(path: &Path) -> Result<Vec<Subject>> {
    let content = fs::read_to_string(path).map_err(Error::at(path))?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse subject manifest {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn subject() -> Subject {
        let mut redcap = BTreeMap::new();
        redcap.insert("redcap.z".to_string(), vec!["Z1".to_string()]);
        redcap.insert(
            "redcap.a".to_string(),
            vec!["A1".to_string(), "A2".to_string()],
        );
        Subject {
            id: "S1".to_string(),
            study: "StudyA".to_string(),
            protected_folder: PathBuf::from("/data/PROTECTED/StudyA/S1"),
            redcap,
        }
    }

    #[test]
    fn test_redcap_ids_order() {
        let s = subject();
        let pairs: Vec<_> = s.redcap_ids().collect();
        assert_eq!(
            pairs,
            vec![("redcap.a", "A1"), ("redcap.a", "A2"), ("redcap.z", "Z1")]
        );
    }

    #[test]
    fn test_surveys_dir() {
        assert_eq!(
            subject().surveys_dir(),
            PathBuf::from("/data/PROTECTED/StudyA/S1/surveys")
        );
    }

    #[test]
    fn test_load_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("subjects.json");
        fs::write(
            &path,
            r#"[
                {"id": "S1", "study": "StudyA", "protected_folder": "/p/S1",
                 "redcap": {"redcap.main": ["S1"]}},
                {"id": "S2", "study": "StudyA", "protected_folder": "/p/S2"}
            ]"#,
        )
        .unwrap();

        let subjects = load_manifest(&path).unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].redcap_ids().count(), 1);
        assert_eq!(subjects[1].redcap_ids().count(), 0);
    }

    #[test]
    fn test_load_manifest_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("subjects.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_manifest(&path), Err(Error::Config(_))));
    }
}
