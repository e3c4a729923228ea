//! Projects command implementation.
//!
//! Shows what the keyring grants a study on one instance. API keys are
//! never printed.

use serde::Serialize;

use crate::config::load_config;
use crate::error::Result;

#[derive(Serialize)]
struct ProjectOutput<'a> {
    instance: &'a str,
    project: &'a str,
    api_url: &'a str,
}

/// Execute the projects command.
///
/// # Errors
///
/// Returns configuration and keyring errors.
pub fn execute(
    study: &str,
    instance: &str,
    config_path: Option<&std::path::Path>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let keyring = config.load_keyring()?;
    let projects = keyring.redcap_projects(study, instance)?;

    if json {
        let output: Vec<_> = projects
            .iter()
            .map(|p| ProjectOutput {
                instance: &p.instance,
                project: &p.project,
                api_url: &p.api_url,
            })
            .collect();
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if projects.is_empty() {
        println!("Study {study} does not sync from {instance}.");
        return Ok(());
    }
    for p in &projects {
        println!("{}  {}", p.project, p.api_url);
    }
    Ok(())
}
