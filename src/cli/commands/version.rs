//! Version command implementation.

use serde::Serialize;

use crate::config::default_config_path;
use crate::error::Result;

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    profile: &'static str,
    default_config: Option<String>,
}

impl VersionInfo {
    fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            profile: if cfg!(debug_assertions) { "debug" } else { "release" },
            default_config: default_config_path().map(|p| p.display().to_string()),
        }
    }
}

/// Print version and the config file used when `--config` is absent.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let info = VersionInfo::current();
    if json {
        println!("{}", serde_json::to_string(&info)?);
        return Ok(());
    }

    println!("{} {} ({})", info.name, info.version, info.profile);
    if let Some(path) = &info.default_config {
        println!("default config: {path}");
    }
    Ok(())
}
