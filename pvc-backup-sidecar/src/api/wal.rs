//! WAL archive endpoints.

use super::AppState;
use crate::utils::Result;
use crate::wal::WalStatus;
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRequest {
    pub cluster_definition: Value,
    pub source_file_name: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    pub cluster_definition: Value,
    pub source_wal_name: String,
    pub destination_file_name: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub cluster_definition: Value,
}

/// POST /wal/archive
pub async fn archive(
    State(state): State<AppState>,
    Json(req): Json<ArchiveRequest>,
) -> Result<Json<Value>> {
    state
        .wal
        .archive(&req.cluster_definition, req.source_file_name)
        .await?;
    Ok(Json(json!({})))
}

/// POST /wal/restore
pub async fn restore(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<Value>> {
    state
        .wal
        .restore(
            &req.cluster_definition,
            req.source_wal_name,
            req.destination_file_name,
        )
        .await?;
    Ok(Json(json!({})))
}

/// POST /wal/status
pub async fn status(
    State(state): State<AppState>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<WalStatus>> {
    Ok(Json(state.wal.status(&req.cluster_definition).await?))
}
