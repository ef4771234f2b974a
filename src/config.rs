use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::services::{DEFAULT_MAX_PAGE_BYTES, DEFAULT_TIMEOUT_SECS};

const APP_DIR: &str = "keyword-intel";
const DB_PATH_ENV: &str = "KEYWORD_INTEL_DB_PATH";
/// Both comparison windows must fit in the 16 months Search Console retains.
pub const MAX_TRENDING_DAYS: u32 = 240;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub claude_api_key: Option<String>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: usize,

    #[serde(default = "default_analysis_concurrency")]
    pub analysis_concurrency: usize,

    #[serde(default = "default_trending_days")]
    pub trending_days: u32,

    #[serde(default = "default_trending_limit")]
    pub trending_limit: usize,

    pub gsc: Option<GscConfig>,
}

/// OAuth client and property for Google Search Console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GscConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Verified property, e.g. `https://example.com/` or `sc-domain:example.com`
    pub site_url: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("keywords.db").to_string_lossy().to_string()
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_page_bytes() -> usize {
    DEFAULT_MAX_PAGE_BYTES
}

fn default_analysis_concurrency() -> usize {
    3
}

fn default_trending_days() -> u32 {
    28
}

fn default_trending_limit() -> usize {
    25
}

fn default_redirect_uri() -> String {
    "urn:ietf:wg:oauth:2.0:oob".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            claude_api_key: None,
            fetch_timeout_secs: default_fetch_timeout(),
            max_page_bytes: default_max_page_bytes(),
            analysis_concurrency: default_analysis_concurrency(),
            trending_days: default_trending_days(),
            trending_limit: default_trending_limit(),
            gsc: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;

        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            config.db_path = path;
        }

        Ok(config)
    }

    /// Read `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.fetch_timeout_secs == 0 {
            return Err(AppError::Config("fetch_timeout_secs must be positive".into()));
        }
        if self.max_page_bytes == 0 {
            return Err(AppError::Config("max_page_bytes must be positive".into()));
        }
        if self.analysis_concurrency == 0 {
            return Err(AppError::Config("analysis_concurrency must be at least 1".into()));
        }
        if self.trending_days == 0 {
            return Err(AppError::Config("trending_days must be at least 1".into()));
        }
        if self.trending_days > MAX_TRENDING_DAYS {
            return Err(AppError::Config(format!(
                "trending_days must be at most {MAX_TRENDING_DAYS}"
            )));
        }
        Ok(())
    }
}
