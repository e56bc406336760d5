use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::key_pair::DEFAULT_KEY_BITS;
use crate::key_pool::{
    default_workers, PoolConfig, DEFAULT_CAPACITY, DEFAULT_MAX_AGE, DEFAULT_ROTATION_INTERVAL,
};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub issuance: IssuanceSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolSettings {
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_rotation_interval_ms")]
    pub rotation_interval_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            key_bits: default_key_bits(),
            workers: default_workers(),
            capacity: default_capacity(),
            max_age_secs: default_max_age_secs(),
            rotation_interval_ms: default_rotation_interval_ms(),
        }
    }
}

fn default_key_bits() -> u32 {
    DEFAULT_KEY_BITS
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE.as_secs()
}

fn default_rotation_interval_ms() -> u64 {
    DEFAULT_ROTATION_INTERVAL.as_millis() as u64
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssuanceSettings {
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_issuer_name")]
    pub issuer_name: String,
    #[serde(default = "default_certificate_name")]
    pub certificate_name: String,
}

impl Default for IssuanceSettings {
    fn default() -> Self {
        Self {
            validity_days: default_validity_days(),
            issuer_name: default_issuer_name(),
            certificate_name: default_certificate_name(),
        }
    }
}

fn default_validity_days() -> u32 {
    30
}

fn default_issuer_name() -> String {
    "Unnamed Issuer".to_string()
}

fn default_certificate_name() -> String {
    "Unnamed Development Certificate".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("certificates")
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(config_str)?;
        Ok(config)
    }

    /// Like [`AppConfig::from_file`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Settings for [`KeyPool::start`](crate::key_pool::KeyPool::start).
    /// Range checks are left to [`PoolConfig::validate`].
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            key_bits: self.pool.key_bits,
            workers: self.pool.workers,
            capacity: self.pool.capacity,
            max_age: Duration::from_secs(self.pool.max_age_secs),
            rotation_interval: Duration::from_millis(self.pool.rotation_interval_ms),
        }
    }
}
