//! Configuration management for the backup sidecar.
//!
//! Loads built-in defaults, then an optional TOML file, then environment
//! variable overrides (`PVC_BACKUP__<SECTION>__<KEY>`).

use crate::executor::backoff::Backoff;
use crate::utils::{Result, SidecarError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "PVC_BACKUP";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub storage: StorageConfig,
    pub backup: BackupModeConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to
    pub listen_address: String,

    /// HTTP API port
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// PGDATA of the instance running next to this sidecar
    pub data_dir: PathBuf,

    /// `pg_controldata` executable
    pub pg_controldata: String,

    /// Instance manager backup endpoint (start/stop/status)
    pub backup_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Mount point of the backup volume
    pub backup_root: PathBuf,

    /// Snapshot store executable
    pub kopia_binary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupModeConfig {
    /// Number of status polls before giving up
    pub steps: u32,

    /// Delay before the first retry, in seconds
    pub initial_delay_secs: f64,

    /// Multiplier applied to the delay after each retry
    pub factor: f64,

    /// Relative jitter applied to every delay (0.1 = ±10%)
    pub jitter: f64,

    /// Upper bound for the best-effort stop issued after a failed backup
    pub stop_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                listen_address: "0.0.0.0".to_string(),
                port: 9090,
            },
            postgres: PostgresConfig {
                data_dir: PathBuf::from("/var/lib/postgresql/data/pgdata"),
                pg_controldata: "pg_controldata".to_string(),
                backup_endpoint: "http://127.0.0.1:8010/pg/backup".to_string(),
            },
            storage: StorageConfig {
                backup_root: PathBuf::from("/backup"),
                kopia_binary: "kopia".to_string(),
            },
            backup: BackupModeConfig {
                steps: 10,
                initial_delay_secs: 1.0,
                factor: 5.0,
                jitter: 0.1,
                stop_timeout_secs: 60,
            },
            log: LogConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration, layering an optional TOML file and the
    /// environment over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default()).map_err(config_error)?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(config_error)?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backup.steps == 0 {
            return Err(SidecarError::Config("backup.steps must be at least 1".into()));
        }
        let delay = self.backup.initial_delay_secs;
        let factor = self.backup.factor;
        if !delay.is_finite() || !factor.is_finite() || delay < 0.0 || factor < 1.0 {
            return Err(SidecarError::Config(
                "backup.initial_delay_secs must be a finite value >= 0 and backup.factor a finite value >= 1"
                    .into(),
            ));
        }
        if !(0.0..1.0).contains(&self.backup.jitter) {
            return Err(SidecarError::Config("backup.jitter must be in [0, 1)".into()));
        }
        Ok(())
    }
}

impl BackupModeConfig {
    /// Backoff schedule used by the start/stop poll loops.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            steps: self.steps,
            duration: Duration::from_secs_f64(self.initial_delay_secs),
            factor: self.factor,
            jitter: self.jitter,
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

fn config_error(e: config::ConfigError) -> SidecarError {
    SidecarError::Config(e.to_string())
}
