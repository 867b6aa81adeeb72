use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error taxonomy.
///
/// Only the session/browser setup variants abort a batch. Everything raised
/// after a session is open is profile-scoped: the orchestrator folds it into
/// that profile's result and moves on.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("no saved session at {}: run the login flow first", path.display())]
    SessionMissing { path: PathBuf },

    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("failed to restore saved session into the browser: {0}")]
    SessionRestore(String),

    #[error("login capture failed: {0}")]
    LoginCapture(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
}

impl ScrapeError {
    /// True for errors that abort the whole batch instead of being folded
    /// into a single profile's result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::SessionMissing { .. }
                | ScrapeError::LaunchFailed(_)
                | ScrapeError::SessionRestore(_)
        )
    }
}
