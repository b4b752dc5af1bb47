//! Caller-facing error taxonomy for lifecycle operations

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The jar a unit needs is not on disk; nothing was spawned
    #[error("{artifact} missing")]
    ArtifactMissing { artifact: String, path: PathBuf },

    #[error("{0} is already running")]
    AlreadyRunning(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid server ID: {0}")]
    InvalidId(String),

    /// The OS refused to launch the process
    #[error("Failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("A download is already in progress")]
    DownloadInProgress,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SupervisorError {
    /// Short machine-readable kind reported to API clients
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactMissing { .. } => "artifact_missing",
            Self::AlreadyRunning(_) => "already_running",
            Self::NotFound(_) => "not_found",
            Self::InvalidId(_) => "invalid_id",
            Self::Spawn { .. } => "spawn_error",
            Self::DownloadInProgress => "download_in_progress",
            Self::Internal(_) => "internal",
        }
    }
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
