use std::path::Path;
use std::time::Duration;

use depot_fs::AtomicWriteOptions;
use depot_pool::PoolOptions;
use depot_state::{PenaltyPolicy, SaveOptions};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Write(#[from] depot_fs::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self { ConfigError::Figment(Box::new(e)) }
}

/// Tunables, layered as defaults < `config.toml` < `DEPOT_*` environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Directory cell the server listing is requested for.
    pub cell_id:            u32,
    pub min_available:      usize,
    pub poll_interval_ms:   u64,
    pub backoff_base_ms:    u64,
    pub max_backoff_ms:     u64,
    /// Unset keeps tokens for the whole process lifetime.
    pub token_ttl_secs:     Option<u64>,
    pub save_quiescence_ms: u64,
    pub save_retry_ms:      u64,
    pub save_max_retry_ms:  u64,
    pub penalty_policy:     PenaltyPolicy,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            cell_id:            0,
            min_available:      8,
            poll_interval_ms:   1_000,
            backoff_base_ms:    1_000,
            max_backoff_ms:     5_000,
            token_ttl_secs:     None,
            save_quiescence_ms: 500,
            save_retry_ms:      100,
            save_max_retry_ms:  5_000,
            penalty_policy:     PenaltyPolicy::Permanent,
        }
    }
}

impl DepotConfig {
    pub const ENV_PREFIX: &str = "DEPOT_";

    pub fn figment(config_file: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file.as_ref()))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    /// Extract the layered configuration. A missing file only means defaults.
    pub fn load(config_file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::figment(config_file).extract()?)
    }

    /// Write this configuration as TOML, replacing `path` atomically.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        depot_fs::atomic_write(path, text.as_bytes(), AtomicWriteOptions::default())?;
        Ok(())
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions::default()
            .cell_id(self.cell_id)
            .min_available(self.min_available)
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .backoff(Duration::from_millis(self.backoff_base_ms), Duration::from_millis(self.max_backoff_ms))
            .token_ttl(self.token_ttl_secs.map(Duration::from_secs))
    }

    pub fn save_options(&self) -> SaveOptions {
        SaveOptions::default()
            .quiescence(Duration::from_millis(self.save_quiescence_ms))
            .retry_interval(Duration::from_millis(self.save_retry_ms))
            .max_retry_interval(Duration::from_millis(self.save_max_retry_ms))
    }
}
