//! Sharded WAL archive on the backup volume.

pub mod archive;
pub mod path;

pub use archive::{archive_wal, restore_wal, wal_status, WalStatus};
pub use path::WalPathResolver;
