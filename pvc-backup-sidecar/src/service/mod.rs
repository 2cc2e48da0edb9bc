//! Request handling behind the HTTP surface.

pub mod backup;
pub mod cluster;
pub mod locks;
pub mod wal;

pub use backup::{BackupResponse, BackupService};
pub use cluster::{decode_backup, decode_cluster, ObjectMeta};
pub use locks::{ClusterGuard, ClusterLocks};
pub use wal::WalService;
