//! Backup executor - drives one physical backup of the local instance.
//!
//! A backup is three sequential steps:
//! - `start`: record the current WAL file, put PostgreSQL in backup mode and
//!   wait until it confirms
//! - `backup`: snapshot the data directory, then every tablespace
//! - `stop`: take PostgreSQL out of backup mode, wait for the final status
//!   and record the WAL file again
//!
//! The WAL markers come from `pg_controldata`, not from the backup status,
//! so they bracket the whole backup window.

pub mod backoff;
pub mod state;
pub mod tablespaces;

pub use backoff::Backoff;
pub use state::ExecutorState;
pub use tablespaces::{list_tablespaces, Tablespace};

use crate::postgres::controldata::current_wal_file;
use crate::postgres::{
    BackupControlClient, BackupPhase, BackupStatus, ControlDataReader, StartBackupRequest,
    StopBackupRequest,
};
use crate::repository::{SnapshotRepository, SnapshotTags, TABLESPACES_FOLDER};
use crate::utils::{Result, SidecarError};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Backup job configuration
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub backup_name: String,
    pub data_dir: PathBuf,
}

/// Backup execution result
#[derive(Debug, Clone)]
pub struct BackupResult {
    pub backup_name: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub begin_wal: String,
    pub end_wal: String,
    pub begin_lsn: String,
    pub end_lsn: String,
    pub backup_label_file: String,
    pub tablespace_map_file: String,
    pub online: bool,
}

/// Main backup executor
pub struct BackupExecutor {
    job: BackupJob,
    control: Arc<dyn BackupControlClient>,
    control_data: Arc<dyn ControlDataReader>,
    repository: SnapshotRepository,
    backoff: Backoff,
    state: ExecutorState,
    /// Set once PostgreSQL has been asked to enter backup mode
    mode_requested: bool,
    started_at: Option<DateTime<Utc>>,
    begin_wal: Option<String>,
    end_wal: Option<String>,
}

impl BackupExecutor {
    pub fn new(
        job: BackupJob,
        control: Arc<dyn BackupControlClient>,
        control_data: Arc<dyn ControlDataReader>,
        repository: SnapshotRepository,
    ) -> Self {
        Self {
            job,
            control,
            control_data,
            repository,
            backoff: Backoff::BACKUP_MODE,
            state: ExecutorState::Idle,
            mode_requested: false,
            started_at: None,
            begin_wal: None,
            end_wal: None,
        }
    }

    /// Replace the schedule used while waiting for backup mode changes.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn begin_wal(&self) -> Option<&str> {
        self.begin_wal.as_deref()
    }

    pub fn end_wal(&self) -> Option<&str> {
        self.end_wal.as_deref()
    }

    /// Runs start, backup and stop.
    ///
    /// When a step fails after PostgreSQL was asked to enter backup mode, a
    /// best-effort stop bounded by `stop_timeout` is attempted before the
    /// original error is returned.
    pub async fn take_backup(
        mut self,
        cancel: &CancellationToken,
        stop_timeout: Duration,
    ) -> Result<BackupResult> {
        info!(backup = %self.job.backup_name, "Starting backup");

        let outcome = match self.start(cancel).await {
            Ok(()) => self.backup(cancel).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            error!(backup = %self.job.backup_name, state = %self.state, error = %e, "Backup failed");
            self.abandon(stop_timeout).await;
            return Err(e);
        }

        self.stop(cancel).await
    }

    /// Puts PostgreSQL in backup mode.
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.expect_state(&[ExecutorState::Idle], "start")?;
        let outcome = self.enter_backup_mode(cancel).await;
        self.settle(outcome, ExecutorState::ModeActive)
    }

    /// Snapshots the data directory and every tablespace.
    pub async fn backup(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.expect_state(&[ExecutorState::ModeActive], "take snapshots")?;
        self.state = ExecutorState::Snapshotting;
        let outcome = self.take_snapshots(cancel).await;
        self.settle(outcome, ExecutorState::ModeActive)
    }

    /// Takes PostgreSQL out of backup mode and returns the backup boundaries.
    ///
    /// Also allowed after an abort, as long as backup mode was requested.
    pub async fn stop(&mut self, cancel: &CancellationToken) -> Result<BackupResult> {
        if !(self.state == ExecutorState::ModeActive
            || (self.state == ExecutorState::Aborted && self.mode_requested))
        {
            return Err(SidecarError::InvalidState {
                operation: "stop",
                state: self.state,
            });
        }

        self.state = ExecutorState::ModeStopping;
        let outcome = self.leave_backup_mode(cancel).await;
        self.settle(outcome, ExecutorState::Completed)
    }

    async fn enter_backup_mode(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.started_at = Some(Utc::now());
        self.begin_wal = Some(current_wal_file(self.control_data.as_ref(), cancel).await?);

        let request = StartBackupRequest {
            immediate_checkpoint: true,
            wait_for_archive: true,
            backup_name: self.job.backup_name.clone(),
            force: true,
        };
        // The request may reach PostgreSQL even if its response never comes
        // back, so a stop is owed from here on.
        self.mode_requested = true;
        self.state = ExecutorState::ModeRequested;
        with_cancel(cancel, self.control.start(&request))
            .await
            .inspect_err(|e| error!(error = %e, "Error while requesting backup mode"))?;

        info!(backup = %self.job.backup_name, "Requesting PostgreSQL backup mode");
        self.wait_for_phase(BackupPhase::Started, cancel)
            .await
            .map_err(|e| match e {
                SidecarError::PhaseNotReached { observed, .. } => {
                    SidecarError::BackupNotStarted { last_phase: observed }
                }
                other => other,
            })?;

        info!(backup = %self.job.backup_name, "Backup mode started");
        Ok(())
    }

    async fn take_snapshots(&self, cancel: &CancellationToken) -> Result<()> {
        let tablespaces = list_tablespaces(&self.job.data_dir.join(TABLESPACES_FOLDER))?;

        info!(path = %self.job.data_dir.display(), "Taking snapshot of data directory");
        self.repository
            .take_snapshot(&self.job.data_dir, &SnapshotTags::base(), cancel)
            .await?;

        for tablespace in &tablespaces {
            info!(
                oid = %tablespace.oid,
                path = %tablespace.path.display(),
                "Taking snapshot of tablespace"
            );
            self.repository
                .take_snapshot(&tablespace.path, &SnapshotTags::tablespace(&tablespace.oid), cancel)
                .await?;
        }

        Ok(())
    }

    async fn leave_backup_mode(&mut self, cancel: &CancellationToken) -> Result<BackupResult> {
        let request = StopBackupRequest {
            backup_name: self.job.backup_name.clone(),
        };
        with_cancel(cancel, self.control.stop(&request))
            .await
            .inspect_err(|e| error!(error = %e, "Error while requesting the end of backup mode"))?;

        info!(backup = %self.job.backup_name, "Stopping PostgreSQL backup mode");
        let status = self
            .wait_for_phase(BackupPhase::Completed, cancel)
            .await
            .map_err(|e| match e {
                SidecarError::PhaseNotReached { observed, .. } => {
                    SidecarError::BackupNotStopped { last_phase: observed }
                }
                other => other,
            })?;
        info!(backup = %self.job.backup_name, "PostgreSQL backup mode stopped");

        let end_wal = current_wal_file(self.control_data.as_ref(), cancel).await?;
        self.end_wal = Some(end_wal.clone());

        Ok(BackupResult {
            backup_name: self.job.backup_name.clone(),
            started_at: self.started_at.unwrap_or_else(Utc::now),
            stopped_at: Utc::now(),
            begin_wal: self.begin_wal.clone().unwrap_or_default(),
            end_wal,
            begin_lsn: status.begin_lsn,
            end_lsn: status.end_lsn,
            backup_label_file: status.label_file,
            tablespace_map_file: status.spcmap_file,
            online: true,
        })
    }

    /// Polls the backup status until `expected` is reported.
    async fn wait_for_phase(
        &self,
        expected: BackupPhase,
        cancel: &CancellationToken,
    ) -> Result<BackupStatus> {
        let control = &self.control;
        backoff::poll(&self.backoff, cancel, || async move {
            let status = control.status().await?;
            let phase = status.phase;
            match phase {
                _ if phase == expected => Ok(status),
                BackupPhase::Failed => Err(SidecarError::BackupFailed(format!(
                    "backup {} failed while waiting for phase {}",
                    status.backup_name, expected
                ))),
                observed => {
                    debug!(%observed, %expected, "Backup mode not reached yet");
                    Err(SidecarError::PhaseNotReached { expected, observed })
                }
            }
        })
        .await
    }

    /// Best-effort exit from backup mode after a failure. Runs on its own
    /// cancellation token so a cancelled caller still releases PostgreSQL.
    async fn abandon(&mut self, stop_timeout: Duration) {
        if !self.mode_requested {
            return;
        }

        warn!(backup = %self.job.backup_name, "Leaving backup mode after failure");
        let cleanup = CancellationToken::new();
        match tokio::time::timeout(stop_timeout, self.stop(&cleanup)).await {
            Ok(Ok(_)) => info!(backup = %self.job.backup_name, "Backup mode released"),
            Ok(Err(e)) => warn!(backup = %self.job.backup_name, error = %e, "Could not leave backup mode"),
            Err(_) => warn!(
                backup = %self.job.backup_name,
                ?stop_timeout,
                "Timed out while leaving backup mode"
            ),
        }
    }

    fn expect_state(&self, allowed: &[ExecutorState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SidecarError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn settle<T>(&mut self, outcome: Result<T>, next: ExecutorState) -> Result<T> {
        self.state = if outcome.is_ok() {
            next
        } else {
            ExecutorState::Aborted
        };
        outcome
    }
}

async fn with_cancel<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        outcome = operation => outcome,
        _ = cancel.cancelled() => Err(SidecarError::Cancelled),
    }
}
