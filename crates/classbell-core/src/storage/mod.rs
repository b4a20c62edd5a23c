mod config;
pub mod database;

pub use config::{
    Config, LeadBounds, ReloadConfig, RemindersConfig, SourceConfig, DEFAULT_ENDPOINT, LEAD_MINUTES_LIMIT,
    RELOAD_INTERVAL_LIMIT,
};
pub use database::{Database, ScheduleStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the classbell data directory, creating it if needed.
///
/// `CLASSBELL_DATA_DIR` overrides the location. Otherwise this is
/// `~/.config/classbell/`, or `~/.config/classbell-dev/` when
/// `CLASSBELL_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("CLASSBELL_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("CLASSBELL_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("classbell-dev")
            } else {
                base_dir.join("classbell")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
