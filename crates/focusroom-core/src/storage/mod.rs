mod config;
pub mod database;
pub mod migrations;
mod snapshot;

pub use config::{Config, NotificationsConfig, TimerConfig};
pub use database::{Database, Stats};
pub use snapshot::{MemorySnapshotStore, PhaseRecord, Snapshot, SnapshotStore};

use std::path::PathBuf;

use crate::error::Result;

/// Returns the focusroom data directory, creating it if needed.
///
/// `FOCUSROOM_DATA_DIR` overrides the location outright. Otherwise the
/// directory is `~/.config/focusroom[-dev]/`; set FOCUSROOM_ENV=dev to use
/// the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("FOCUSROOM_DATA_DIR") {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("FOCUSROOM_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusroom-dev")
            } else {
                base_dir.join("focusroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
