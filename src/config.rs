use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::Result;
use directories::ProjectDirs;
use serde::Deserialize;

use crate::kill_service::KillPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub kill_chunk_size: usize,
    pub kill_retry_timeout_ms: u64,
    /// Attempt budget before an instance is force-expunged.
    /// `None` (or zero in file/env form) means unbounded retries.
    pub kill_retry_max: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_chunk_size")]
    kill_chunk_size: usize,
    #[serde(default = "default_retry_timeout_ms")]
    kill_retry_timeout_ms: u64,
    #[serde(default)]
    kill_retry_max: Option<u32>,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            kill_chunk_size: raw.kill_chunk_size,
            kill_retry_timeout_ms: raw.kill_retry_timeout_ms,
            kill_retry_max: normalize_retry_max(raw.kill_retry_max),
        }
    }
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut cfg = if let Some(path) = path {
            let raw = fs::read_to_string(path)?;
            Config::from(toml::from_str::<RawConfig>(&raw)?)
        } else {
            let default_path = default_config_path();
            if default_path.exists() {
                let raw = fs::read_to_string(&default_path)?;
                Config::from(toml::from_str::<RawConfig>(&raw)?)
            } else {
                Self::default_from_env()
            }
        };

        maybe_env_usize(&mut cfg.kill_chunk_size, "KILL_CHUNK_SIZE");
        maybe_env_u64(&mut cfg.kill_retry_timeout_ms, "KILL_RETRY_TIMEOUT_MS");
        if let Ok(v) = env::var("KILL_RETRY_MAX") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.kill_retry_max = normalize_retry_max(Some(n));
            }
        }
        validate_required(&cfg)?;
        Ok(cfg)
    }

    pub fn kill_retry_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_retry_timeout_ms)
    }

    pub fn kill_policy(&self) -> KillPolicy {
        KillPolicy {
            chunk_size: self.kill_chunk_size,
            retry_timeout: self.kill_retry_timeout(),
            retry_max: self.kill_retry_max,
        }
    }
}

impl Config {
    fn default_from_env() -> Self {
        Self {
            kill_chunk_size: env_usize("KILL_CHUNK_SIZE", default_chunk_size()),
            kill_retry_timeout_ms: env_u64("KILL_RETRY_TIMEOUT_MS", default_retry_timeout_ms()),
            kill_retry_max: normalize_retry_max(
                env::var("KILL_RETRY_MAX").ok().and_then(|v| v.parse().ok()),
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kill_chunk_size: default_chunk_size(),
            kill_retry_timeout_ms: default_retry_timeout_ms(),
            kill_retry_max: None,
        }
    }
}

fn default_config_path() -> PathBuf {
    default_state_dir().join("config.toml")
}

fn default_state_dir() -> PathBuf {
    ProjectDirs::from("com", "taskreaper", "taskreaper")
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".taskreaper"))
}

fn validate_required(cfg: &Config) -> Result<()> {
    if cfg.kill_chunk_size == 0 {
        anyhow::bail!("kill_chunk_size must be at least 1");
    }
    if cfg.kill_retry_timeout_ms == 0 {
        anyhow::bail!("kill_retry_timeout_ms must be at least 1");
    }
    Ok(())
}

/// A zero attempt budget means "never give up", same as leaving it unset.
fn normalize_retry_max(raw: Option<u32>) -> Option<u32> {
    raw.filter(|&n| n > 0)
}

fn default_chunk_size() -> usize {
    100
}

fn default_retry_timeout_ms() -> u64 {
    10_000
}

fn maybe_env_usize(val: &mut usize, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<usize>() {
            *val = n;
        }
    }
}

fn maybe_env_u64(val: &mut u64, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<u64>() {
            *val = n;
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
