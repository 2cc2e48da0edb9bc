//! Per-cluster layout of the backup volume.
//!
//! ```text
//! <root>/<cluster>/base            snapshot repository
//! <root>/<cluster>/kopia.config    repository client configuration
//! <root>/<cluster>/kopia-cache/    repository cache and logs
//! <root>/<cluster>/wals/           WAL archive
//! ```

use crate::repository::RepositoryLocation;
use crate::wal::WalPathResolver;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn cluster_path(&self, cluster: &str) -> PathBuf {
        self.root.join(cluster)
    }

    pub fn repository(&self, cluster: &str) -> RepositoryLocation {
        let cluster_path = self.cluster_path(cluster);
        RepositoryLocation {
            path: cluster_path.join("base"),
            config_file: cluster_path.join("kopia.config"),
            cache_directory: cluster_path.join("kopia-cache"),
        }
    }

    pub fn wal_resolver(&self) -> WalPathResolver {
        WalPathResolver::new(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_paths_do_not_overlap() {
        let layout = StorageLayout::new("/backup");
        let repository = layout.repository("pg");

        assert_eq!(repository.path, PathBuf::from("/backup/pg/base"));
        assert_eq!(repository.config_file, PathBuf::from("/backup/pg/kopia.config"));
        assert_eq!(repository.cache_directory, PathBuf::from("/backup/pg/kopia-cache"));
        assert_eq!(layout.wal_resolver().wal_root("pg"), PathBuf::from("/backup/pg/wals"));
        assert_ne!(layout.repository("pg").path, layout.repository("pg2").path);
    }
}
