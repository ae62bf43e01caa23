//! TOML configuration.
//!
//! Looked up at `--config <path>`, then `<config home>/ffcal/config.toml`;
//! missing files and missing keys fall back to defaults.

use anyhow::Context;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::scraping::pacing::Pacing;
use crate::symbols::SymbolMappingConfig;

pub const DEFAULT_BASE_URL: &str = "https://www.forexfactory.com/calendar";

/// How range runs walk the span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Windows via range URLs, falling back to single days
    #[default]
    Range,
    /// Day by day from the start
    Daily,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub base_url: String,
    /// Page-load timeout in seconds
    pub timeout: u64,
    pub retry_attempts: u32,
    pub days_back: i64,
    pub days_forward: i64,
    pub months_per_chunk: u32,
    pub headless: bool,
    pub strategy: Strategy,
    pub js_probe_attempts: u32,
    pub chrome_path: Option<PathBuf>,
    pub pacing: Pacing,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: 30,
            retry_attempts: 3,
            days_back: 90,
            days_forward: 90,
            months_per_chunk: 1,
            headless: true,
            strategy: Strategy::Range,
            js_probe_attempts: 10,
            chrome_path: None,
            pacing: Pacing::default(),
        }
    }
}

impl ScrapingConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("output/economic_events.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Local `HH:MM` for the daily job
    pub run_time: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_time: "06:00".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn run_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.run_time.trim(), "%H:%M").map_err(|_| {
            ScrapeError::Config(format!(
                "scheduler.run_time must be HH:MM, got '{}'",
                self.run_time
            ))
            .into()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scraping: ScrapingConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub symbol_mapping: SymbolMappingConfig,
}

impl Config {
    /// Load from `path`, else the default location, else built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path),
                None => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ScrapeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scraping.base_url.trim().is_empty() {
            return Err(ScrapeError::Config("scraping.base_url is empty".to_string()).into());
        }
        if self.scraping.days_back < 0 || self.scraping.days_forward < 0 {
            return Err(
                ScrapeError::Config("days_back/days_forward must not be negative".to_string())
                    .into(),
            );
        }
        self.scraping
            .pacing
            .validate()
            .map_err(|e| ScrapeError::Config(format!("scraping.pacing: {}", e)))?;
        self.scheduler.run_time()?;
        Ok(())
    }
}

/// `<config home>/ffcal/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join("ffcal").join("config.toml"))
}
