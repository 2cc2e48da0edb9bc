//! WAL archive operations on the backup volume.

use super::path::WalPathResolver;
use crate::fs::{copy_file, file_exists};
use crate::utils::{Result, SidecarError};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Oldest and newest archived WAL file. Empty when nothing was archived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalStatus {
    pub first_wal: String,
    pub last_wal: String,
}

/// Copies `source` into the archive of `cluster`, returning the archive path.
///
/// Archiving the same file twice is harmless.
pub fn archive_wal(resolver: &WalPathResolver, cluster: &str, source: &Path) -> Result<PathBuf> {
    let wal_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| SidecarError::InvalidWalName(source.display().to_string()))?;

    let destination = resolver.archive_path(cluster, &wal_name)?;
    copy_file(source, &destination).map_err(|e| SidecarError::fs(source, e))?;
    Ok(destination)
}

/// Copies archived `wal_name` of `cluster` to `destination`, returning the
/// archive path it was read from.
pub fn restore_wal(
    resolver: &WalPathResolver,
    cluster: &str,
    wal_name: &str,
    destination: &Path,
) -> Result<PathBuf> {
    let source = resolver.archive_path(cluster, wal_name)?;

    let exists = file_exists(&source).map_err(|e| SidecarError::fs(&source, e))?;
    if !exists {
        return Err(SidecarError::fs(
            &source,
            std::io::Error::new(ErrorKind::NotFound, format!("WAL file {wal_name} not archived")),
        ));
    }

    copy_file(&source, destination).map_err(|e| SidecarError::fs(destination, e))?;
    Ok(source)
}

/// First entry of the first shard and last entry of the last shard, by name.
pub fn wal_status(resolver: &WalPathResolver, cluster: &str) -> Result<WalStatus> {
    let root = resolver.wal_root(cluster);

    let shards = match sorted_entries(&root) {
        Ok(shards) => shards,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(WalStatus::default()),
        Err(e) => return Err(SidecarError::fs(&root, e)),
    };

    let (Some(first_shard), Some(last_shard)) = (shards.first(), shards.last()) else {
        return Ok(WalStatus::default());
    };

    Ok(WalStatus {
        first_wal: shard_entry(first_shard, |names| names.first())?,
        last_wal: shard_entry(last_shard, |names| names.last())?,
    })
}

fn shard_entry(
    shard: &Path,
    pick: impl Fn(&[String]) -> Option<&String>,
) -> Result<String> {
    if !shard.is_dir() {
        return Err(SidecarError::NotADirectory(shard.to_path_buf()));
    }

    let names: Vec<String> = sorted_entries(shard)
        .map_err(|e| SidecarError::fs(shard, e))?
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();

    Ok(pick(&names).cloned().unwrap_or_default())
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map(|e| e.into_path()).map_err(std::io::Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SEGMENT: &str = "000000010000000000000003";

    fn write_segment(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_archive_then_restore_round_trip() {
        let backup = TempDir::new().unwrap();
        let pg_wal = TempDir::new().unwrap();
        let resolver = WalPathResolver::new(backup.path());
        let content: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        let source = write_segment(pg_wal.path(), SEGMENT, &content);

        let archived = archive_wal(&resolver, "pg", &source).unwrap();
        assert_eq!(archived, resolver.archive_path("pg", SEGMENT).unwrap());

        let restored = pg_wal.path().join("RECOVERYXLOG");
        restore_wal(&resolver, "pg", SEGMENT, &restored).unwrap();

        assert_eq!(std::fs::read(restored).unwrap(), content);
    }

    #[test]
    fn test_archive_is_idempotent() {
        let backup = TempDir::new().unwrap();
        let pg_wal = TempDir::new().unwrap();
        let resolver = WalPathResolver::new(backup.path());
        let source = write_segment(pg_wal.path(), SEGMENT, b"wal bytes");

        archive_wal(&resolver, "pg", &source).unwrap();
        let archived = archive_wal(&resolver, "pg", &source).unwrap();

        assert_eq!(std::fs::read(archived).unwrap(), b"wal bytes");
    }

    #[test]
    fn test_restore_missing_wal() {
        let backup = TempDir::new().unwrap();
        let resolver = WalPathResolver::new(backup.path());

        let err = restore_wal(&resolver, "pg", SEGMENT, &backup.path().join("out")).unwrap_err();
        match err {
            SidecarError::Filesystem { source, .. } => assert_eq!(source.kind(), ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_status_without_archive() {
        let backup = TempDir::new().unwrap();
        let resolver = WalPathResolver::new(backup.path());

        assert_eq!(wal_status(&resolver, "pg").unwrap(), WalStatus::default());
    }

    #[test]
    fn test_status_reports_first_and_last_wal() {
        let backup = TempDir::new().unwrap();
        let pg_wal = TempDir::new().unwrap();
        let resolver = WalPathResolver::new(backup.path());

        for name in [
            "000000010000000100000002",
            "000000010000000000000009",
            "000000010000000000000003",
            "000000010000000100000001",
        ] {
            let source = write_segment(pg_wal.path(), name, name.as_bytes());
            archive_wal(&resolver, "pg", &source).unwrap();
        }

        let status = wal_status(&resolver, "pg").unwrap();
        assert_eq!(status.first_wal, "000000010000000000000003");
        assert_eq!(status.last_wal, "000000010000000100000002");
    }

    #[test]
    fn test_status_rejects_stray_file_in_wal_root() {
        let backup = TempDir::new().unwrap();
        let resolver = WalPathResolver::new(backup.path());
        let root = resolver.wal_root("pg");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("zzzz"), b"").unwrap();

        let err = wal_status(&resolver, "pg").unwrap_err();
        assert!(matches!(err, SidecarError::NotADirectory(_)));
    }
}
