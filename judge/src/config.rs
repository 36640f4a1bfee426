//! Worker configuration loaded from a TOML file

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::languages::RawLanguageConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    pub path: PathConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Per-language command overrides, keyed by language name
    #[serde(default)]
    pub languages: HashMap<String, RawLanguageConfig>,
}

/// Filesystem roots
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathConfig {
    /// Root of per-job work directories, `<work>/<rid>/`
    pub work: PathBuf,
    /// Root of per-problem test data, `<data>/<pid>/`
    pub data: PathBuf,
}

impl PathConfig {
    pub fn work_dir(&self, rid: i64) -> PathBuf {
        self.work.join(rid.to_string())
    }

    pub fn data_dir(&self, pid: i64) -> PathBuf {
        self.data.join(pid.to_string())
    }
}

/// Coordinator address
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Optional URL prefix in front of every endpoint, e.g. "/api/judge"
    #[serde(default)]
    pub base_path: String,
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.host,
            self.port,
            self.base_path.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JudgeConfig {
    /// CPU budget for compilation
    pub compile_time_limit_ms: u64,
    /// Ceiling on bytes a submission may write per test case
    pub output_limit_bytes: u64,
    pub poll_interval_ms: u64,
    /// Wall-clock ceiling is `limit * wall_time_factor + wall_time_grace_ms`
    pub wall_time_factor: u32,
    pub wall_time_grace_ms: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            compile_time_limit_ms: 20_000,
            output_limit_bytes: 256_000_000,
            poll_interval_ms: 1,
            wall_time_factor: 2,
            wall_time_grace_ms: 1000,
        }
    }
}

impl JudgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wall_time_grace(&self) -> Duration {
        Duration::from_millis(self.wall_time_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    pub period_ms: u64,
    /// Maximum verdicts per exchange
    pub batch_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            batch_size: 20,
            request_timeout_secs: 30,
        }
    }
}

impl TransportConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Fixed delay between attempts of a failed download or removal
    pub retry_delay_ms: u64,
    /// Attempts per file; unbounded when absent
    pub max_attempts: Option<u32>,
    /// Attempts of the manifest check inside a sync before giving up
    pub check_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1000,
            max_attempts: None,
            check_attempts: 3,
        }
    }
}

impl WorkerConfig {
    /// Load and validate the config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: WorkerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.path.work.is_absolute() {
            anyhow::bail!("path.work must be absolute: {}", self.path.work.display());
        }
        if !self.path.data.is_absolute() {
            anyhow::bail!("path.data must be absolute: {}", self.path.data.display());
        }
        if self.server.host.is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if self.judge.poll_interval_ms == 0 {
            anyhow::bail!("judge.poll_interval_ms must be positive");
        }
        if self.transport.batch_size == 0 {
            anyhow::bail!("transport.batch_size must be positive");
        }
        if self.sync.check_attempts == 0 {
            anyhow::bail!("sync.check_attempts must be positive");
        }
        if self.sync.max_attempts == Some(0) {
            anyhow::bail!("sync.max_attempts must be positive when set");
        }
        Ok(())
    }
}
