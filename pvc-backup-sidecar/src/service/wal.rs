//! WAL archive requests for one cluster at a time.

use super::cluster::decode_cluster;
use crate::layout::StorageLayout;
use crate::utils::{Result, SidecarError};
use crate::wal::{self, WalPathResolver, WalStatus};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub struct WalService {
    resolver: WalPathResolver,
}

impl WalService {
    pub fn new(layout: &StorageLayout) -> Self {
        Self {
            resolver: layout.wal_resolver(),
        }
    }

    /// Archives the WAL file at `source` for the cluster in `cluster_definition`.
    pub async fn archive(&self, cluster_definition: &Value, source: PathBuf) -> Result<PathBuf> {
        let cluster = decode_cluster(cluster_definition)?.name;
        let resolver = self.resolver.clone();

        let started = std::time::Instant::now();
        let archived = blocking(move || wal::archive_wal(&resolver, &cluster, &source)).await?;
        info!(
            path = %archived.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "WAL file archived"
        );
        Ok(archived)
    }

    /// Restores archived `wal_name` to `destination`.
    pub async fn restore(
        &self,
        cluster_definition: &Value,
        wal_name: String,
        destination: PathBuf,
    ) -> Result<PathBuf> {
        let cluster = decode_cluster(cluster_definition)?.name;
        let resolver = self.resolver.clone();

        let dest = destination.clone();
        let result = blocking(move || wal::restore_wal(&resolver, &cluster, &wal_name, &dest)).await;
        match &result {
            Ok(source) => info!(
                source = %source.display(),
                destination = %destination.display(),
                "WAL file restored"
            ),
            Err(e) => warn!(destination = %destination.display(), error = %e, "WAL restore failed"),
        }
        result
    }

    pub async fn status(&self, cluster_definition: &Value) -> Result<WalStatus> {
        let cluster = decode_cluster(cluster_definition)?.name;
        let resolver = self.resolver.clone();

        let status = blocking(move || wal::wal_status(&resolver, &cluster)).await?;
        debug!(first = %status.first_wal, last = %status.last_wal, "WAL archive status");
        Ok(status)
    }

    pub fn wal_root(&self, cluster: &str) -> PathBuf {
        self.resolver.wal_root(cluster)
    }
}

/// Runs filesystem work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SidecarError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const WAL: &str = "000000010000000000000003";

    fn cluster() -> Value {
        json!({"kind": "Cluster", "metadata": {"name": "pg"}})
    }

    #[tokio::test]
    async fn test_archive_then_restore() {
        let dir = TempDir::new().unwrap();
        let service = WalService::new(&StorageLayout::new(dir.path().join("backup")));

        let source = dir.path().join(WAL);
        std::fs::write(&source, b"segment").unwrap();

        let archived = service.archive(&cluster(), source).await.unwrap();
        assert_eq!(
            archived,
            service.wal_root("pg").join("0000000100000000").join(WAL)
        );

        let destination = dir.path().join("restore/RECOVERYXLOG");
        service
            .restore(&cluster(), WAL.to_string(), destination.clone())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"segment");

        let status = service.status(&cluster()).await.unwrap();
        assert_eq!(status.first_wal, WAL);
        assert_eq!(status.last_wal, WAL);
    }

    #[tokio::test]
    async fn test_restore_missing_wal_fails() {
        let dir = TempDir::new().unwrap();
        let service = WalService::new(&StorageLayout::new(dir.path()));

        let err = service
            .restore(&cluster(), WAL.to_string(), dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::Filesystem { .. }));
    }

    #[tokio::test]
    async fn test_status_of_unknown_cluster_is_empty() {
        let dir = TempDir::new().unwrap();
        let service = WalService::new(&StorageLayout::new(dir.path()));

        assert_eq!(service.status(&cluster()).await.unwrap(), WalStatus::default());
    }

    #[tokio::test]
    async fn test_invalid_cluster_definition() {
        let dir = TempDir::new().unwrap();
        let service = WalService::new(&StorageLayout::new(dir.path()));

        let err = service.status(&json!({"spec": {}})).await.unwrap_err();
        assert!(matches!(err, SidecarError::Decode(_)));
    }
}
