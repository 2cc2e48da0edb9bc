//! Plugin identity reported to the operator.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub display_name: String,
    pub project_url: String,
    pub repository_url: String,
    pub license: String,
    pub license_url: String,
    pub maturity: String,
    pub vendor: String,
}

/// Services this plugin implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Backup,
    Wal,
}

pub const CAPABILITIES: &[Capability] = &[Capability::Backup, Capability::Wal];

impl PluginMetadata {
    pub fn new() -> Self {
        Self {
            name: "pvc-backup.cloudnative-pg.io".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            display_name: "Backup and recovery of PostgreSQL clusters on a PVC".to_string(),
            project_url: "https://github.com/cloudnative-pg/plugin-pvc-backup".to_string(),
            repository_url: "https://github.com/cloudnative-pg/plugin-pvc-backup".to_string(),
            license: "Apache 2".to_string(),
            license_url: "https://github.com/cloudnative-pg/plugin-pvc-backup/blob/main/LICENSE"
                .to_string(),
            maturity: "alpha".to_string(),
            vendor: "CloudNative-PG Community".to_string(),
        }
    }
}

impl Default for PluginMetadata {
    fn default() -> Self {
        Self::new()
    }
}
