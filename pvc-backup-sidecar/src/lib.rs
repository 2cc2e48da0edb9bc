//! PVC Backup Sidecar Library
//!
//! Physical backups of a PostgreSQL instance onto a mounted volume: drives
//! the instance in and out of hot-backup mode, snapshots PGDATA and its
//! tablespaces with kopia, and keeps a sharded WAL archive next to them.

pub mod api;
pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod layout;
pub mod metadata;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod utils;
pub mod wal;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use utils::{Result, SidecarError};
