//! Collaborators living next to the PostgreSQL instance.

pub mod control_client;
pub mod controldata;

pub use control_client::{
    BackupControlClient, BackupPhase, BackupStatus, HttpBackupControlClient, StartBackupRequest,
    StopBackupRequest,
};
pub use controldata::{ControlDataReader, PgControlData};
