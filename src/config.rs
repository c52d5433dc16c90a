//! Configuration loader and validator for the shelter registry sync service.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::schedule::DailySchedule;

/// Environment variable that overrides `shelter.service_key`.
pub const SERVICE_KEY_ENV: &str = "SHELTER_SERVICE_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub shelter: Shelter,
    pub schedule: Schedule,
    pub serving: Serving,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Public shelter registry API settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shelter {
    pub base_url: String,
    pub service_key: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_animal_kind_codes")]
    pub animal_kind_codes: Vec<String>,
}

impl fmt::Debug for Shelter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shelter")
            .field("base_url", &self.base_url)
            .field("service_key", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .field("max_concurrency", &self.max_concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("animal_kind_codes", &self.animal_kind_codes)
            .finish()
    }
}

impl Shelter {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Scheduled trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    /// Local wall-clock time of the daily run, `HH:MM`.
    pub daily_at: String,
}

/// Serving-path settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Serving {
    #[serde(default = "default_max_conflict_attempts")]
    pub max_conflict_attempts: u32,
}

fn default_page_size() -> u32 {
    100
}

fn default_max_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_animal_kind_codes() -> Vec<String> {
    vec!["417000".into(), "422400".into(), "429900".into()]
}

fn default_max_conflict_attempts() -> u32 {
    5
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/shelter.db", self.app.data_dir))
    }

    pub fn daily_schedule(&self) -> Result<DailySchedule, ConfigError> {
        DailySchedule::parse(&self.schedule.daily_at)
            .map_err(|_| ConfigError::Invalid("schedule.daily_at must be HH:MM"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(SERVICE_KEY_ENV) {
            if !key.trim().is_empty() {
                self.shelter.service_key = key;
            }
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let shelter = &cfg.shelter;
    if shelter.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("shelter.base_url must be non-empty"));
    }
    if reqwest::Url::parse(&shelter.base_url).is_err() {
        return Err(ConfigError::Invalid("shelter.base_url must be an absolute URL"));
    }
    if shelter.service_key.trim().is_empty() {
        return Err(ConfigError::Invalid("shelter.service_key must be non-empty"));
    }
    if shelter.page_size == 0 {
        return Err(ConfigError::Invalid("shelter.page_size must be > 0"));
    }
    if shelter.max_concurrency == 0 {
        return Err(ConfigError::Invalid("shelter.max_concurrency must be > 0"));
    }
    if shelter.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("shelter.request_timeout_secs must be > 0"));
    }
    if shelter.animal_kind_codes.is_empty()
        || shelter.animal_kind_codes.iter().any(|c| c.trim().is_empty())
    {
        return Err(ConfigError::Invalid(
            "shelter.animal_kind_codes must list non-empty codes",
        ));
    }

    cfg.daily_schedule()?;

    if cfg.serving.max_conflict_attempts == 0 {
        return Err(ConfigError::Invalid("serving.max_conflict_attempts must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

shelter:
  base_url: "https://apis.data.go.kr/1543061/abandonmentPublicSrvc"
  service_key: "YOUR_DATA_GO_KR_SERVICE_KEY"
  page_size: 100
  max_concurrency: 4
  request_timeout_secs: 30
  animal_kind_codes:
    - "417000"
    - "422400"
    - "429900"

schedule:
  daily_at: "04:00"

serving:
  max_conflict_attempts: 5
"#
}
