//! Backup endpoint.

use super::AppState;
use crate::service::BackupResponse;
use crate::utils::{Result, SidecarError};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    pub cluster_definition: Value,
    pub backup_definition: Value,
}

/// POST /backup - Take a physical backup of the local instance
///
/// The backup runs in its own task on a child of the shutdown token. If the
/// client goes away the token is cancelled, and the task still gets to take
/// the database out of backup mode before it ends.
pub async fn backup(
    State(state): State<AppState>,
    Json(req): Json<BackupRequest>,
) -> Result<Json<BackupResponse>> {
    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let service = state.backup.clone();
    let task = tokio::spawn(async move {
        service
            .backup(&req.cluster_definition, &req.backup_definition, &cancel)
            .await
    });

    let response = task
        .await
        .map_err(|e| SidecarError::Io(std::io::Error::other(e)))??;
    Ok(Json(response))
}
