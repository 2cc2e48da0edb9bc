//! Tablespace discovery from the symlinks under `pg_tblspc`.

use crate::utils::{Result, SidecarError};
use std::path::{Path, PathBuf};
use tracing::error;

/// A tablespace location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tablespace {
    /// OID of the tablespace inside the database
    pub oid: String,

    /// Where the tablespace data is stored
    pub path: PathBuf,
}

/// Lists the tablespaces linked from `folder`, sorted by OID name.
///
/// Every symbolic link is a tablespace; anything else is ignored. Failing to
/// read the folder or a link aborts the listing.
pub fn list_tablespaces(folder: &Path) -> Result<Vec<Tablespace>> {
    let entries = std::fs::read_dir(folder).map_err(|e| SidecarError::fs(folder, e))?;

    let mut tablespaces = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SidecarError::fs(folder, e))?;
        let link = entry.path();

        let file_type = entry.file_type().map_err(|e| SidecarError::fs(&link, e))?;
        if !file_type.is_symlink() {
            continue;
        }

        let target = std::fs::read_link(&link).map_err(|e| {
            error!(link = %link.display(), error = %e, "Error while reading tablespace link");
            SidecarError::fs(&link, e)
        })?;

        tablespaces.push(Tablespace {
            oid: entry.file_name().to_string_lossy().into_owned(),
            path: target,
        });
    }

    tablespaces.sort_by(|a, b| a.oid.cmp(&b.oid));
    Ok(tablespaces)
}
