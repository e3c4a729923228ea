//! Keyring access for REDCap credentials.
//!
//! The keyring is a nested JSON document shared with the rest of the
//! pipeline. Only two parts of it matter here:
//!
//! ```json
//! {
//!   "lochness": { "REDCAP": { "<study>": { "<instance>": ["<project>"] } } },
//!   "<instance>": { "URL": "https://redcap.example.org", "API_TOKEN": { "<project>": "..." } }
//! }
//! ```
//!
//! Everything else in the document is ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Path appended to an instance URL to reach its API endpoint.
pub const API_PATH: &str = "/api/";

/// Parsed keyring document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Keyring {
    #[serde(default)]
    lochness: LochnessSection,

    /// Every other top-level section, keyed by instance name.
    #[serde(flatten)]
    sections: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LochnessSection {
    /// study -> instance -> projects
    #[serde(rename = "REDCAP")]
    redcap: Option<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InstanceSection {
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "API_TOKEN")]
    api_token: Option<BTreeMap<String, String>>,
}

/// One REDCap project a study is allowed to sync.
#[derive(Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub instance: String,
    pub project: String,
    pub api_url: String,
    pub api_key: String,
}

impl fmt::Debug for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectRef")
            .field("instance", &self.instance)
            .field("project", &self.project)
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Keyring {
    /// Load a keyring from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a keyring error if the file is unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Keyring(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Parse a keyring from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns a keyring error if the document is malformed.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::Keyring(format!("Failed to parse keyring: {e}")))
    }

    fn instance(&self, name: &str) -> Result<Option<InstanceSection>> {
        self.sections
            .get(name)
            .map(|v| {
                InstanceSection::deserialize(v)
                    .map_err(|e| Error::Keyring(format!("{name} is malformed in keyring: {e}")))
            })
            .transpose()
    }

    /// Resolve the projects `study` may sync from `instance`.
    ///
    /// Mandatory entries are checked first and fail with a keyring error:
    /// `lochness > REDCAP`, the instance section, its `URL`, its
    /// `API_TOKEN`. A study that does not use this instance yields an empty
    /// list. A listed project without a token is an error, not a skip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Keyring`] for any missing mandatory entry.
    pub fn redcap_projects(&self, study: &str, instance: &str) -> Result<Vec<ProjectRef>> {
        let studies = self
            .lochness
            .redcap
            .as_ref()
            .ok_or_else(|| Error::Keyring("lochness > REDCAP not found in keyring".into()))?;
        let section = self
            .instance(instance)?
            .ok_or_else(|| Error::Keyring(format!("{instance} not found in keyring")))?;
        let url = section
            .url
            .ok_or_else(|| Error::Keyring(format!("{instance} > URL not found in keyring")))?;
        let tokens = section.api_token.ok_or_else(|| {
            Error::Keyring(format!("{instance} > API_TOKEN not found in keyring"))
        })?;

        let api_url = api_url(&url);

        let Some(instances) = studies.get(study) else {
            debug!("lochness > REDCAP > {study} not found in keyring");
            return Ok(Vec::new());
        };
        let Some(projects) = instances.get(instance) else {
            debug!("lochness > REDCAP > {study} > {instance} not found in keyring");
            return Ok(Vec::new());
        };

        projects
            .iter()
            .map(|project| {
                let api_key = tokens.get(project).ok_or_else(|| {
                    Error::Keyring(format!(
                        "{instance} > API_TOKEN > {project} not found in keyring"
                    ))
                })?;
                Ok(ProjectRef {
                    instance: instance.to_string(),
                    project: project.clone(),
                    api_url: api_url.clone(),
                    api_key: api_key.clone(),
                })
            })
            .collect()
    }
}

/// Normalize an instance URL into its API endpoint.
#[must_use]
pub fn api_url(url: &str) -> String {
    format!("{}{API_PATH}", url.trim_end_matches('/'))
}
