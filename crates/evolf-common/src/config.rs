//! Client configuration.
//!
//! Read from `evolf.toml` in the working directory, or from the path in
//! `EVOLF_CONFIG`. Every field has a default, so an empty file is valid.
//! `EVOLF_API_BASE_URL` and `EVOLF_API_TIMEOUT_SECS` override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EvolfError, Result};

pub const CONFIG_ENV: &str = "EVOLF_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "evolf.toml";

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub site: SiteConfig,
}

// ── API ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST backend, including any `/api` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Fixed per-request timeout, independent of poll delays
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String { "http://localhost:3000/api".to_string() }
fn default_timeout_secs() -> u64 { 30 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Polling ───────────────────────────────────────────────────────────────────

/// Backoff schedule for job status polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay before the second poll (the first one is immediate)
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Ceiling for any single delay
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_interval_ms() -> u64 { 40_000 }
fn default_max_interval_ms() -> u64 { 900_000 }
fn default_multiplier() -> f64 { 1.5 }

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl PollingConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

// ── Downloads ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Where result archives are saved
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf { PathBuf::from(".") }

impl Default for DownloadConfig {
    fn default() -> Self {
        Self { output_dir: default_output_dir() }
    }
}

// ── Site ──────────────────────────────────────────────────────────────────────

/// Public web front end, used to build shareable result links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_url")]
    pub base_url: String,
}

fn default_site_url() -> String { "http://localhost:8080".to_string() }

impl Default for SiteConfig {
    fn default() -> Self {
        Self { base_url: default_site_url() }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ClientConfig {
    /// `EVOLF_CONFIG` if set, otherwise `evolf.toml`.
    pub fn config_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load from [`ClientConfig::config_path`], then apply env overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file(path)?.finish()
    }

    /// Like [`ClientConfig::load`], but a missing file yields defaults.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Self::defaults_with_env()
        }
    }

    /// Built-in defaults plus env overrides.
    pub fn defaults_with_env() -> Result<Self> {
        Self::default().finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides()?;
        self.validate()?;
        Ok(self)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EvolfError::Config(format!(
                "Config file not found: {}\nCopy evolf.example.toml to evolf.toml and edit it.",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EvolfError::Config(format!("Invalid config: {}", e)))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("EVOLF_API_BASE_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
        if let Ok(secs) = std::env::var("EVOLF_API_TIMEOUT_SECS") {
            self.api.timeout_secs = secs
                .trim()
                .parse()
                .map_err(|_| EvolfError::Config(format!("EVOLF_API_TIMEOUT_SECS is not a number: {}", secs)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url)
            .map_err(|e| EvolfError::Config(format!("api.base_url {}: {}", self.api.base_url, e)))?;
        url::Url::parse(&self.site.base_url)
            .map_err(|e| EvolfError::Config(format!("site.base_url {}: {}", self.site.base_url, e)))?;
        if self.api.timeout_secs == 0 {
            return Err(EvolfError::Config("api.timeout_secs must be greater than zero".into()));
        }
        if !(self.polling.multiplier.is_finite() && self.polling.multiplier >= 1.0) {
            return Err(EvolfError::Config("polling.multiplier must be at least 1.0".into()));
        }
        if self.polling.initial_interval_ms > self.polling.max_interval_ms {
            return Err(EvolfError::Config(
                "polling.initial_interval_ms must not exceed polling.max_interval_ms".into(),
            ));
        }
        Ok(())
    }
}
