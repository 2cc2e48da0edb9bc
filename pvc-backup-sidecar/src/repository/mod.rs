//! Content-addressed snapshot repository backed by kopia.
//!
//! One repository exists per cluster. It is created the first time a backup
//! runs for that cluster and reused afterwards; this module never deletes it.

pub mod tags;
pub mod tool;

pub use tags::SnapshotTags;
pub use tool::{KopiaCli, SnapshotTool};

use crate::fs::is_dir;
use crate::utils::{Result, SidecarError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Folder of PGDATA holding the WAL segments
pub const WAL_FOLDER: &str = "pg_wal";

/// Folder of PGDATA holding one symlink per tablespace
pub const TABLESPACES_FOLDER: &str = "pg_tblspc";

/// Where a repository and its local client state live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub path: PathBuf,
    pub config_file: PathBuf,
    pub cache_directory: PathBuf,
}

pub struct SnapshotRepository {
    location: RepositoryLocation,
    tool: Arc<dyn SnapshotTool>,
}

impl SnapshotRepository {
    /// Opens the repository at `location`, creating it first if its
    /// directory does not exist yet.
    ///
    /// A new repository is configured to ignore the WAL and tablespace
    /// folders of `data_dir`: WAL is archived on its own and every
    /// tablespace gets a dedicated snapshot.
    pub async fn open(
        location: RepositoryLocation,
        data_dir: &Path,
        tool: Arc<dyn SnapshotTool>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let repository = Self { location, tool };

        let exists = is_dir(&repository.location.path)
            .map_err(|e| SidecarError::fs(&repository.location.path, e))?;
        if !exists {
            repository.initialize(data_dir, cancel).await?;
        }

        Ok(repository)
    }

    async fn initialize(&self, data_dir: &Path, cancel: &CancellationToken) -> Result<()> {
        info!(path = %self.location.path.display(), "Creating snapshot repository");

        let args = vec![
            "repository".to_string(),
            "create".to_string(),
            "filesystem".to_string(),
            format!("--path={}", self.location.path.display()),
            format!("--config-file={}", self.location.config_file.display()),
            self.log_dir_argument(),
            format!("--cache-directory={}", self.location.cache_directory.display()),
        ];
        self.tool.run(&args, cancel).await?;

        self.add_ignore_folder(&data_dir.join(WAL_FOLDER), cancel).await?;
        self.add_ignore_folder(&data_dir.join(TABLESPACES_FOLDER), cancel).await?;

        Ok(())
    }

    async fn add_ignore_folder(&self, folder: &Path, cancel: &CancellationToken) -> Result<()> {
        let args = vec![
            "policy".to_string(),
            "set".to_string(),
            folder.display().to_string(),
            self.log_dir_argument(),
            "--add-ignore=.".to_string(),
            self.config_file_argument(),
        ];
        self.tool.run(&args, cancel).await
    }

    /// Takes a snapshot of `path`, attaching `tags`.
    pub async fn take_snapshot(
        &self,
        path: &Path,
        tags: &SnapshotTags,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut args = vec![
            "snapshot".to_string(),
            "create".to_string(),
            self.log_dir_argument(),
            self.config_file_argument(),
            path.display().to_string(),
        ];
        if let Some(tags) = tags.to_argument() {
            args.push(format!("--tags={tags}"));
        }

        self.tool.run(&args, cancel).await
    }

    fn log_dir_argument(&self) -> String {
        format!("--log-dir={}", self.location.cache_directory.join("log").display())
    }

    fn config_file_argument(&self) -> String {
        format!("--config-file={}", self.location.config_file.display())
    }
}
