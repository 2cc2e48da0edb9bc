//! Utility modules for the backup sidecar.

pub mod errors;
pub mod logger;

pub use errors::{Result, SidecarError};
