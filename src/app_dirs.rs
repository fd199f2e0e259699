use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `$HOME/.local/state/keytest`, or the platform data dir without a HOME
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join("keytest"))
        } else {
            ProjectDirs::from("", "", "keytest").map(|pd| pd.data_local_dir().to_path_buf())
        }
    }

    pub fn outbox_path() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("outbox.db"))
    }

    pub fn history_path() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("results.csv"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("keytest.log"))
    }
}
