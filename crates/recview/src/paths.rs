use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use directories_next::{ProjectDirs, UserDirs};

pub const ENV_CONFIG_DIR: &str = "RECVIEW_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "recsurface";
const APPLICATION: &str = "recview";
const CONFIG_FILE: &str = "config.toml";

/// `config.toml` under `$RECVIEW_CONFIG_DIR`, or the platform config directory.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(ENV_CONFIG_DIR).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir).join(CONFIG_FILE));
    }
    let dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .ok_or_else(|| anyhow!("failed to determine user directories"))?;
    Ok(dirs.config_dir().join(CONFIG_FILE))
}

/// The user's video directory, else the current directory.
pub fn default_output_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.video_dir().map(|dir| dir.join(APPLICATION)))
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn recording_file_name(at: DateTime<Local>) -> String {
    format!("{APPLICATION}-{}.mp4", at.format("%Y%m%d-%H%M%S"))
}
