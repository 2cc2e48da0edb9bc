//! HTTP API of the sidecar.

pub mod backup;
pub mod error;
pub mod health;
pub mod wal;

use crate::config::Config;
use crate::layout::StorageLayout;
use crate::metadata::PluginMetadata;
use crate::service::{BackupService, WalService};
use crate::utils::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub backup: Arc<BackupService>,
    pub wal: Arc<WalService>,
    pub metadata: Arc<PluginMetadata>,
    /// Cancelled when the process shuts down; every request runs on a child.
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(backup: BackupService, wal: WalService, shutdown: CancellationToken) -> Self {
        Self {
            backup: Arc::new(backup),
            wal: Arc::new(wal),
            metadata: Arc::new(PluginMetadata::new()),
            shutdown,
            started_at: Instant::now(),
        }
    }

    /// State wired to the real collaborators described by `config`.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let layout = StorageLayout::new(config.storage.backup_root.clone());
        Ok(Self::new(
            BackupService::from_config(config)?,
            WalService::new(&layout),
            shutdown,
        ))
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/identity", get(health::identity))
        // Backup endpoint
        .route("/backup", post(backup::backup))
        // WAL endpoints
        .route("/wal/archive", post(wal::archive))
        .route("/wal/restore", post(wal::restore))
        .route("/wal/status", post(wal::status))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
