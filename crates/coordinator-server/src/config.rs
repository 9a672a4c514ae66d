//! Server configuration (spec §6 environment variables, §10.3).
//!
//! Layered as: built-in defaults -> optional `config.toml` -> `COORD_*`
//! environment variables (highest precedence), mirroring the model
//! repository's `ServerConfigBuilder` split between an infallible `build()`
//! and a validating `try_build()`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Raw, serde-deserializable shape loaded by the `config` crate. Kept
/// separate from [`CoordinatorConfig`] so every field can have a
/// `#[serde(default = ...)]` without polluting the validated type with
/// `Option`s the rest of the server would have to keep unwrapping.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    #[serde(default = "default_store_path")]
    store_path: String,
    #[serde(default = "default_snapshot_path")]
    snapshot_path: String,
    #[serde(default)]
    master_secret: String,
    #[serde(default)]
    static_tokens_path: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_heartbeat_soft_s")]
    heartbeat_soft_s: u64,
    #[serde(default = "default_heartbeat_hard_s")]
    heartbeat_hard_s: u64,
    #[serde(default = "default_ingest_queue_cap")]
    ingest_queue_cap: usize,
    #[serde(default = "default_retention_days")]
    retention_days: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".into()
}
fn default_store_path() -> String {
    "./data/interactions".into()
}
fn default_snapshot_path() -> String {
    "./data/snapshot.json".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_heartbeat_soft_s() -> u64 {
    30
}
fn default_heartbeat_hard_s() -> u64 {
    90
}
fn default_ingest_queue_cap() -> usize {
    10_000
}
fn default_retention_days() -> u64 {
    30
}

/// Validated runtime configuration for the `coordinator-server` binary.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub listen_addr: SocketAddr,
    pub store_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub master_secret: Vec<u8>,
    pub static_tokens_path: Option<PathBuf>,
    pub log_level: String,
    pub heartbeat_soft: Duration,
    pub heartbeat_hard: Duration,
    pub ingest_queue_cap: usize,
    pub retention: Duration,
}

impl CoordinatorConfig {
    /// Load defaults, an optional `config.toml` in the working directory,
    /// then `COORD_*` environment overrides, and validate the result.
    pub fn try_build() -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("COORD").try_parsing(true))
            .build()?;

        let raw: RawConfig = raw.try_deserialize()?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let listen_addr = raw
            .listen_addr
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("COORD_LISTEN_ADDR: {e}")))?;

        if raw.master_secret.is_empty() {
            return Err(ConfigError::Invalid("COORD_MASTER_SECRET must not be empty".into()));
        }
        if raw.heartbeat_soft_s == 0 || raw.heartbeat_soft_s >= raw.heartbeat_hard_s {
            return Err(ConfigError::Invalid(
                "COORD_HEARTBEAT_SOFT_S must be positive and less than COORD_HEARTBEAT_HARD_S".into(),
            ));
        }
        if raw.ingest_queue_cap == 0 {
            return Err(ConfigError::Invalid("COORD_INGEST_QUEUE_CAP must be positive".into()));
        }

        Ok(Self {
            listen_addr,
            store_path: PathBuf::from(raw.store_path),
            snapshot_path: PathBuf::from(raw.snapshot_path),
            master_secret: raw.master_secret.into_bytes(),
            static_tokens_path: raw.static_tokens_path.map(PathBuf::from),
            log_level: raw.log_level,
            heartbeat_soft: Duration::from_secs(raw.heartbeat_soft_s),
            heartbeat_hard: Duration::from_secs(raw.heartbeat_hard_s),
            ingest_queue_cap: raw.ingest_queue_cap,
            retention: Duration::from_secs(raw.retention_days * 86_400),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_secret(secret: &str) -> RawConfig {
        RawConfig {
            listen_addr: default_listen_addr(),
            store_path: default_store_path(),
            snapshot_path: default_snapshot_path(),
            master_secret: secret.into(),
            static_tokens_path: None,
            log_level: default_log_level(),
            heartbeat_soft_s: default_heartbeat_soft_s(),
            heartbeat_hard_s: default_heartbeat_hard_s(),
            ingest_queue_cap: default_ingest_queue_cap(),
            retention_days: default_retention_days(),
        }
    }

    #[test]
    fn empty_master_secret_is_rejected() {
        let err = CoordinatorConfig::validate(raw_with_secret("")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn valid_config_builds() {
        let cfg = CoordinatorConfig::validate(raw_with_secret("s3cret")).unwrap();
        assert_eq!(cfg.heartbeat_soft, Duration::from_secs(30));
        assert_eq!(cfg.retention, Duration::from_secs(30 * 86_400));
    }

    #[test]
    fn soft_ttl_must_be_less_than_hard_ttl() {
        let mut raw = raw_with_secret("s3cret");
        raw.heartbeat_soft_s = 90;
        raw.heartbeat_hard_s = 90;
        assert!(CoordinatorConfig::validate(raw).is_err());
    }
}
