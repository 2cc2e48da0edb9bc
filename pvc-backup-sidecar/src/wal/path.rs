//! Archive location of WAL files.
//!
//! `<base>/<cluster>/wals/<first 16 chars of name>/<name>`: the 16-character
//! prefix is the timeline plus the high half of the segment number, so one
//! shard directory holds a bounded, contiguous run of segments.

use crate::utils::{Result, SidecarError};
use std::path::PathBuf;

pub const WALS_DIRECTORY: &str = "wals";

/// Length of the shard directory name taken from the WAL file name.
pub const SHARD_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalPathResolver {
    base_path: PathBuf,
}

impl WalPathResolver {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Root of the WAL archive of `cluster`.
    pub fn wal_root(&self, cluster: &str) -> PathBuf {
        self.base_path.join(cluster).join(WALS_DIRECTORY)
    }

    /// Archive path of `wal_name` for `cluster`.
    pub fn archive_path(&self, cluster: &str, wal_name: &str) -> Result<PathBuf> {
        let shard = shard_prefix(wal_name)?;
        Ok(self.wal_root(cluster).join(shard).join(wal_name))
    }
}

/// Shard directory name of `wal_name`.
pub fn shard_prefix(wal_name: &str) -> Result<&str> {
    let invalid = wal_name.is_empty()
        || wal_name == "."
        || wal_name == ".."
        || !wal_name.is_ascii()
        || wal_name.contains(['/', '\\']);
    if invalid {
        return Err(SidecarError::InvalidWalName(wal_name.to_string()));
    }

    wal_name
        .get(..SHARD_PREFIX_LEN)
        .ok_or_else(|| SidecarError::InvalidWalName(wal_name.to_string()))
}
