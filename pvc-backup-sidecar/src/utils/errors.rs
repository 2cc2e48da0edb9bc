//! Custom error types for the backup sidecar.

use crate::postgres::control_client::BackupPhase;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid definition: {0}")]
    Decode(String),

    #[error("Instance manager error ({code}): {message}")]
    ControlProtocol { code: String, message: String },

    /// The database has not reached the expected backup phase yet. This is
    /// the only error kind the backup-mode poll loops retry.
    #[error("backup phase is {observed}, waiting for {expected}")]
    PhaseNotReached {
        expected: BackupPhase,
        observed: BackupPhase,
    },

    #[error("backup not started (last observed phase: {last_phase})")]
    BackupNotStarted { last_phase: BackupPhase },

    #[error("backup not stopped (last observed phase: {last_phase})")]
    BackupNotStopped { last_phase: BackupPhase },

    #[error("PostgreSQL reported a failed backup: {0}")]
    BackupFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("cannot {operation} while executor is {state}")]
    InvalidState {
        operation: &'static str,
        state: crate::executor::ExecutorState,
    },

    #[error("{command} failed ({status}): {output}")]
    ExternalTool {
        command: String,
        status: String,
        output: String,
    },

    #[error("Control data field not found: {0}")]
    ControlData(String),

    #[error("Invalid WAL name: {0:?}")]
    InvalidWalName(String),

    #[error("A backup is already running for cluster {0}")]
    BackupInProgress(String),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

impl SidecarError {
    /// Whether a backup-mode poll loop may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SidecarError::PhaseNotReached { .. })
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SidecarError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SidecarError>;
