//! Runtime configuration loaded from a TOML file.
//!
//! Endpoints, the report path and SMTP credentials all come from here; nothing
//! environment-specific is compiled in. The SMTP password may be supplied via
//! `DAILY_REPORT_SMTP_PASSWORD` instead of the file.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ReportError;

pub const PASSWORD_ENV: &str = "DAILY_REPORT_SMTP_PASSWORD";
const CONFIG_FILENAME: &str = "config.toml";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sales: SalesConfig,
    pub quotes: QuotesConfig,
    pub report: ReportConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SalesConfig {
    /// Base URL of the sales backend; `/export_daily_sales` is appended
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotesConfig {
    pub endpoint: String,
    /// Top-level quote object holding `value_avg` (e.g. "oficial", "blue")
    #[serde(default = "default_quote_kind")]
    pub kind: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub path: PathBuf,
    pub recipient: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address; falls back to `username`
    pub from: Option<String>,
}

impl SmtpConfig {
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

impl SalesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl QuotesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_quote_kind() -> String {
    "oficial".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl Config {
    /// Parse and validate configuration text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ReportError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, applying environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.smtp.password = password;
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("sales.base_url", self.sales.base_url.as_str()),
            ("quotes.endpoint", self.quotes.endpoint.as_str()),
            ("quotes.kind", self.quotes.kind.as_str()),
            ("report.recipient", self.report.recipient.as_str()),
            ("smtp.host", self.smtp.host.as_str()),
            ("smtp.username", self.smtp.username.as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ReportError::Config(format!("{} must not be empty", key)).into());
            }
        }
        if self.report.path.as_os_str().is_empty() {
            return Err(ReportError::Config("report.path must not be empty".to_string()).into());
        }
        Ok(())
    }
}

/// Default config location: `$XDG_CONFIG_HOME/daily-report/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dir_spec::config_home)
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join("daily-report").join(CONFIG_FILENAME))
}
