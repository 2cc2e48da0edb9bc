//! Client for the instance manager's online-backup endpoint.
//!
//! The instance manager running next to PostgreSQL exposes a single
//! resource: `POST` starts backup mode, `PUT` stops it and `GET` returns the
//! current status. Every response is wrapped in a `{data, error}` envelope.

use crate::utils::{Result, SidecarError};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backup-mode phase as reported by the instance manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupPhase {
    Started,
    #[default]
    InProgress,
    Completed,
    Failed,
}

impl From<&str> for BackupPhase {
    fn from(value: &str) -> Self {
        match value {
            "started" => BackupPhase::Started,
            "completed" => BackupPhase::Completed,
            "failed" => BackupPhase::Failed,
            // "starting", "closing" and anything we do not know yet
            _ => BackupPhase::InProgress,
        }
    }
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupPhase::Started => "started",
            BackupPhase::InProgress => "in-progress",
            BackupPhase::Completed => "completed",
            BackupPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl<'de> Deserialize<'de> for BackupPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(BackupPhase::from(value.as_str()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBackupRequest {
    pub immediate_checkpoint: bool,
    pub wait_for_archive: bool,
    pub backup_name: String,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopBackupRequest {
    pub backup_name: String,
}

/// Status payload of the running (or last) backup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default)]
    pub backup_name: String,
    #[serde(default)]
    pub phase: BackupPhase,
    #[serde(default, rename = "beginLSN")]
    pub begin_lsn: String,
    #[serde(default, rename = "endLSN")]
    pub end_lsn: String,
    /// Content of `backup_label`
    #[serde(default, deserialize_with = "base64_text")]
    pub label_file: String,
    /// Content of `tablespace_map`
    #[serde(default, deserialize_with = "base64_text")]
    pub spcmap_file: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Byte arrays are encoded as base64 strings on the wire.
fn base64_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Control of PostgreSQL backup mode.
#[async_trait]
pub trait BackupControlClient: Send + Sync {
    /// Ask the instance to enter backup mode.
    async fn start(&self, request: &StartBackupRequest) -> Result<()>;

    /// Ask the instance to leave backup mode.
    async fn stop(&self, request: &StopBackupRequest) -> Result<()>;

    /// Fetch the current backup status.
    async fn status(&self) -> Result<BackupStatus>;
}

/// HTTP implementation talking to the local instance manager.
pub struct HttpBackupControlClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackupControlClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(endpoint = %self.endpoint, %status, "instance manager response");

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                SidecarError::Serialization(e)
            } else {
                SidecarError::ControlProtocol {
                    code: status.as_u16().to_string(),
                    message: body.clone(),
                }
            }
        })?;

        if let Some(error) = envelope.error {
            return Err(SidecarError::ControlProtocol {
                code: error.code,
                message: error.message,
            });
        }
        if !status.is_success() {
            return Err(SidecarError::ControlProtocol {
                code: status.as_u16().to_string(),
                message: body,
            });
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl BackupControlClient for HttpBackupControlClient {
    async fn start(&self, request: &StartBackupRequest) -> Result<()> {
        self.send::<serde_json::Value>(self.client.post(&self.endpoint).json(request))
            .await?;
        Ok(())
    }

    async fn stop(&self, request: &StopBackupRequest) -> Result<()> {
        self.send::<serde_json::Value>(self.client.put(&self.endpoint).json(request))
            .await?;
        Ok(())
    }

    async fn status(&self) -> Result<BackupStatus> {
        self.send::<BackupStatus>(self.client.get(&self.endpoint))
            .await?
            .ok_or_else(|| SidecarError::ControlProtocol {
                code: "empty".to_string(),
                message: "status response carried no data".to_string(),
            })
    }
}
