//! Control-file introspection through `pg_controldata`.

use crate::utils::{Result, SidecarError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Field holding the WAL segment of the latest checkpoint's redo point.
pub const REDO_WAL_FILE_FIELD: &str = "Latest checkpoint's REDO WAL file";

/// Source of the `pg_controldata` key/value map.
#[async_trait]
pub trait ControlDataReader: Send + Sync {
    async fn read_control_data(&self, cancel: &CancellationToken) -> Result<HashMap<String, String>>;
}

/// Reads the WAL file containing the latest checkpoint's redo point.
pub async fn current_wal_file(
    reader: &dyn ControlDataReader,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut data = reader.read_control_data(cancel).await?;
    data.remove(REDO_WAL_FILE_FIELD)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SidecarError::ControlData(REDO_WAL_FILE_FIELD.to_string()))
}

/// Runs `pg_controldata` against the local data directory.
pub struct PgControlData {
    binary: String,
    data_dir: PathBuf,
}

impl PgControlData {
    pub fn new(binary: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl ControlDataReader for PgControlData {
    async fn read_control_data(&self, cancel: &CancellationToken) -> Result<HashMap<String, String>> {
        let child = tokio::process::Command::new(&self.binary)
            .arg("-D")
            .arg(&self.data_dir)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            output = child => output?,
            _ = cancel.cancelled() => return Err(SidecarError::Cancelled),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(
                binary = %self.binary,
                data_dir = %self.data_dir.display(),
                output = %stderr,
                "Error invoking pg_controldata"
            );
            return Err(SidecarError::ExternalTool {
                command: self.binary.clone(),
                status: output.status.to_string(),
                output: stderr,
            });
        }

        Ok(parse_control_data(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses `key: value` lines. Keys may themselves contain `'` but never `:`.
pub fn parse_control_data(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
