//! Backup requests: one physical backup of the local instance per call.

use super::cluster::{decode_backup, decode_cluster};
use super::locks::ClusterLocks;
use crate::config::Config;
use crate::executor::{Backoff, BackupExecutor, BackupJob, BackupResult};
use crate::layout::StorageLayout;
use crate::postgres::{BackupControlClient, ControlDataReader, HttpBackupControlClient, PgControlData};
use crate::repository::{KopiaCli, SnapshotRepository, SnapshotTool};
use crate::utils::Result;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Backup outcome reported to the operator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResponse {
    pub backup_id: String,
    pub backup_name: String,
    /// Unix seconds
    pub started_at: i64,
    /// Unix seconds
    pub stopped_at: i64,
    pub begin_wal: String,
    pub end_wal: String,
    pub begin_lsn: String,
    pub end_lsn: String,
    pub backup_label_file: String,
    pub tablespace_map_file: String,
    pub online: bool,
}

impl From<BackupResult> for BackupResponse {
    fn from(result: BackupResult) -> Self {
        Self {
            backup_id: result.backup_name.clone(),
            backup_name: result.backup_name,
            started_at: result.started_at.timestamp(),
            stopped_at: result.stopped_at.timestamp(),
            begin_wal: result.begin_wal,
            end_wal: result.end_wal,
            begin_lsn: result.begin_lsn,
            end_lsn: result.end_lsn,
            backup_label_file: result.backup_label_file,
            tablespace_map_file: result.tablespace_map_file,
            online: result.online,
        }
    }
}

pub struct BackupService {
    layout: StorageLayout,
    data_dir: PathBuf,
    control: Arc<dyn BackupControlClient>,
    control_data: Arc<dyn ControlDataReader>,
    tool: Arc<dyn SnapshotTool>,
    backoff: Backoff,
    stop_timeout: Duration,
    locks: ClusterLocks,
}

impl BackupService {
    pub fn new(
        layout: StorageLayout,
        data_dir: PathBuf,
        control: Arc<dyn BackupControlClient>,
        control_data: Arc<dyn ControlDataReader>,
        tool: Arc<dyn SnapshotTool>,
    ) -> Self {
        Self {
            layout,
            data_dir,
            control,
            control_data,
            tool,
            backoff: Backoff::BACKUP_MODE,
            stop_timeout: Duration::from_secs(60),
            locks: ClusterLocks::new(),
        }
    }

    /// Service wired to the real instance manager, `pg_controldata` and kopia.
    pub fn from_config(config: &Config) -> Result<Self> {
        let control = HttpBackupControlClient::new(config.postgres.backup_endpoint.clone())?;
        let control_data = PgControlData::new(
            config.postgres.pg_controldata.clone(),
            config.postgres.data_dir.clone(),
        );

        Ok(Self::new(
            StorageLayout::new(config.storage.backup_root.clone()),
            config.postgres.data_dir.clone(),
            Arc::new(control),
            Arc::new(control_data),
            Arc::new(KopiaCli::new(config.storage.kopia_binary.clone())),
        )
        .with_backoff(config.backup.backoff())
        .with_stop_timeout(config.backup.stop_timeout()))
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn locks(&self) -> &ClusterLocks {
        &self.locks
    }

    /// Takes a backup of the cluster described by `cluster_definition`.
    ///
    /// Only one backup per cluster runs at a time; a concurrent request is
    /// rejected rather than queued.
    pub async fn backup(
        &self,
        cluster_definition: &Value,
        backup_definition: &Value,
        cancel: &CancellationToken,
    ) -> Result<BackupResponse> {
        let cluster = decode_cluster(cluster_definition)
            .inspect_err(|e| error!(error = %e, "Error while decoding cluster definition"))?;
        let backup = decode_backup(backup_definition)
            .inspect_err(|e| error!(error = %e, "Error while decoding backup definition"))?;

        let _guard = self.locks.try_acquire(&cluster.name)?;
        info!(cluster = %cluster.name, backup = %backup.name, "Backup requested");

        let repository = SnapshotRepository::open(
            self.layout.repository(&cluster.name),
            &self.data_dir,
            Arc::clone(&self.tool),
            cancel,
        )
        .await?;

        let executor = BackupExecutor::new(
            BackupJob {
                backup_name: backup.name.clone(),
                data_dir: self.data_dir.clone(),
            },
            Arc::clone(&self.control),
            Arc::clone(&self.control_data),
            repository,
        )
        .with_backoff(self.backoff);

        let result = executor.take_backup(cancel, self.stop_timeout).await?;
        info!(
            cluster = %cluster.name,
            backup = %result.backup_name,
            begin_wal = %result.begin_wal,
            end_wal = %result.end_wal,
            "Backup completed"
        );

        Ok(result.into())
    }
}
