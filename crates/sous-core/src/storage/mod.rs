mod config;
pub mod database;
pub mod kv;

pub use config::{ApiConfig, BridgeConfig, Config, TimersConfig};
pub use database::Database;
pub use kv::{KvStore, MemoryKv};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/sous[-dev]/` based on SOUS_ENV.
///
/// Set SOUS_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("SOUS_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("sous-dev")
    } else {
        base_dir.join("sous")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
