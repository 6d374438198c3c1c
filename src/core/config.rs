use super::error::ValidationError;
use super::price::{SourcePriority, validate_instrument};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// A tracked fund and its identifiers at each source.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Fund {
    pub isin: String,
    /// FT tearsheet symbol, e.g. `LU0563745743:EUR`.
    pub ft: Option<String>,
    /// Fundsquare instrument id (`idInstr`).
    pub fundsquare: Option<String>,
}

fn default_ft_request_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FtProviderConfig {
    pub base_url: String,
    /// Pause between two funds, to stay polite with the site.
    #[serde(default = "default_ft_request_delay_ms")]
    pub request_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FundsquareProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub request_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub ft: Option<FtProviderConfig>,
    pub fundsquare: Option<FundsquareProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            ft: Some(FtProviderConfig {
                base_url: "https://markets.ft.com".to_string(),
                request_delay_ms: default_ft_request_delay_ms(),
            }),
            fundsquare: Some(FundsquareProviderConfig {
                base_url: "https://www.fundsquare.net".to_string(),
                request_delay_ms: 0,
            }),
        }
    }
}

fn default_retention_days() -> usize {
    3653
}

fn default_stale_hours() -> u64 {
    20
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub funds: Vec<Fund>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Most recent dates kept per fund.
    #[serde(default = "default_retention_days")]
    pub retention_days: usize,
    #[serde(default)]
    pub source_priority: SourcePriority,
    /// Age of the last successful run after which data is reported stale.
    #[serde(default = "default_stale_hours")]
    pub stale_hours: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub data_path: Option<String>,
    pub export_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("net", "navkeep", "navkeep")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("net", "navkeep", "navkeep")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn default_export_path(&self) -> Result<PathBuf> {
        match &self.export_path {
            Some(custom_path) => Ok(PathBuf::from(custom_path)),
            None => Ok(self.default_data_path()?.join("json")),
        }
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source_priority.validate()?;
        self.retention()?;
        for fund in &self.funds {
            validate_instrument(&fund.isin)?;
        }
        Ok(())
    }

    pub fn retention(&self) -> Result<NonZeroUsize, ValidationError> {
        NonZeroUsize::new(self.retention_days).ok_or(ValidationError::ZeroRetention)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stale_hours as i64)
    }
}
