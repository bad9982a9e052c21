//! Shared helpers for locating and opening the tag database.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::Database;
use crate::config::TaggingConfig;

/// Gets the cross-platform database path.
///
/// Returns the path as `{data_dir}/tagr/tags.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
///
/// # Errors
///
/// Returns an error if the data directory cannot be determined.
pub fn get_database_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("tagr").join("tags.db"))
}

/// Ensures the parent directory of the database file exists.
///
/// Creates the directory structure if it doesn't exist using `create_dir_all`.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

/// Opens the database named by `config`, or the default path.
pub fn open_database(config: &TaggingConfig) -> Result<Database> {
    let db_path = match &config.db_path {
        Some(path) => path.clone(),
        None => get_database_path()?,
    };
    ensure_database_directory(&db_path)?;

    Database::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))
}
