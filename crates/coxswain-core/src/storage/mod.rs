//! Session persistence side-channel.

use std::path::PathBuf;

pub mod sessions;

pub use sessions::{SessionInfo, SessionStore};

/// Default database path under the user data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coxswain")
        .join("coxswain.db")
}
