//! Configuration file loading and validation.
//!
//! The configuration is read once at startup by [`load_config`] and then passed
//! by reference to every component. Nothing here runs at module load: a
//! missing or broken file only surfaces when `load_config` is called.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable holding an alternative configuration path.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Environment variable holding the LlamaParse API key.
pub const LLAMA_API_KEY_ENV: &str = "LLAMA_CLOUD_API_KEY";

/// File name used when neither an explicit path nor `CONFIG_PATH` is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

const DEFAULT_LLAMA_BASE_URL: &str = "https://api.cloud.llamaindex.ai";

static SPANISH_MONTHS: Lazy<BTreeMap<String, String>> = Lazy::new(|| {
    [
        ("enero", "01"),
        ("febrero", "02"),
        ("marzo", "03"),
        ("abril", "04"),
        ("mayo", "05"),
        ("junio", "06"),
        ("julio", "07"),
        ("agosto", "08"),
        ("septiembre", "09"),
        ("setiembre", "09"),
        ("octubre", "10"),
        ("noviembre", "11"),
        ("diciembre", "12"),
    ]
    .into_iter()
    .map(|(name, number)| (name.to_string(), number.to_string()))
    .collect()
});

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {}\n  {hint}", .path.display())]
    NotFound { path: PathBuf, hint: String },
    #[error("failed to parse configuration file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("environment variable {0} is not set")]
    MissingApiKey(&'static str),
}

/// Validated process-wide settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub download: DownloadConfig,
    pub paths: PathsConfig,
    pub date_patterns: DatePatternsConfig,
    /// Lowercase month name → two-digit month number.
    #[serde(default = "default_months")]
    pub months: BTreeMap<String, String>,
    #[serde(default)]
    pub llama_parse: LlamaParseConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DownloadConfig {
    pub url: String,
    pub max_retries: u32,
    /// Seconds; the n-th wait is `backoff_base * 2^(n-1)`.
    pub backoff_base: f64,
    /// Per-request timeout in seconds.
    pub timeout: u64,
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Backoff base as a duration. [`Config::validate`] rejects values that
    /// do not fit.
    pub fn backoff_base(&self) -> Duration {
        seconds(self.backoff_base)
    }
}

/// Seconds as a [`Duration`], saturating at the representable range.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

fn check_seconds(key: &str, value: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(_) => Ok(()),
        Err(_) => Err(ConfigError::Invalid(format!(
            "{key} must be a non-negative number of seconds that fits a duration, got {value}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PathsConfig {
    pub json_status_file: PathBuf,
    pub debug_file: PathBuf,
    pub raw_pdf_base: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatePatternsConfig {
    pub primary: String,
    pub fallback: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LlamaParseConfig {
    #[serde(default = "default_result_type")]
    pub result_type: ResultType,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_llama_base_url")]
    pub base_url: String,
    /// Seconds between job status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    /// Seconds to wait for a parse job before giving up.
    #[serde(default = "default_max_wait")]
    pub max_wait: f64,
}

impl LlamaParseConfig {
    pub fn poll_interval(&self) -> Duration {
        seconds(self.poll_interval)
    }

    pub fn max_wait(&self) -> Duration {
        seconds(self.max_wait)
    }
}

impl Default for LlamaParseConfig {
    fn default() -> Self {
        Self {
            result_type: default_result_type(),
            verbose: false,
            language: default_language(),
            base_url: default_llama_base_url(),
            poll_interval: default_poll_interval(),
            max_wait: default_max_wait(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Markdown,
    Text,
}

impl ResultType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultType::Markdown => "markdown",
            ResultType::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistoryConfig {
    /// Drop history entries whose PDF no longer exists when loading.
    #[serde(default)]
    pub verify_paths: bool,
}

fn default_months() -> BTreeMap<String, String> {
    SPANISH_MONTHS.clone()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_result_type() -> ResultType {
    ResultType::Markdown
}

fn default_language() -> String {
    "es".to_string()
}

fn default_llama_base_url() -> String {
    DEFAULT_LLAMA_BASE_URL.to_string()
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_max_wait() -> f64 {
    2000.0
}

impl Config {
    /// Parse configuration contents. `origin` is only used in error messages.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Err(ConfigError::Parse {
                path: origin.to_path_buf(),
                reason: "the configuration file is empty".to_string(),
            });
        }
        let mut config: Config = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.months = config
            .months
            .into_iter()
            .map(|(name, number)| (name.to_lowercase(), number))
            .collect();
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot drive a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "download.max_retries must be at least 1".into(),
            ));
        }
        check_seconds("download.backoff_base", self.download.backoff_base)?;
        if self.download.url.trim().is_empty() {
            return Err(ConfigError::Invalid("download.url is empty".into()));
        }
        log_level_filter(&self.logging.level)?;
        check_seconds("llama_parse.poll_interval", self.llama_parse.poll_interval)?;
        check_seconds("llama_parse.max_wait", self.llama_parse.max_wait)?;
        for (name, number) in &self.months {
            let valid = number.len() == 2
                && number
                    .parse::<u8>()
                    .is_ok_and(|n| (1..=12).contains(&n));
            if !valid {
                return Err(ConfigError::Invalid(format!(
                    "months.{name} must be a two-digit month number, got {number:?}"
                )));
            }
        }
        crate::date::DateExtractor::from_config(self)?;
        Ok(())
    }
}

/// Normalized `log` level for a configured name such as `INFO` or `debug`.
pub fn log_level_filter(level: &str) -> Result<log::LevelFilter, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Ok(log::LevelFilter::Off),
        "error" | "critical" => Ok(log::LevelFilter::Error),
        "warn" | "warning" => Ok(log::LevelFilter::Warn),
        "info" => Ok(log::LevelFilter::Info),
        "debug" => Ok(log::LevelFilter::Debug),
        "trace" => Ok(log::LevelFilter::Trace),
        other => Err(ConfigError::Invalid(format!(
            "logging.level {other:?} is not one of off, error, warn, info, debug, trace"
        ))),
    }
}

/// Pick the configuration file: explicit path, then `CONFIG_PATH`, then the default.
pub fn resolve_config_path(explicit: Option<&Path>, env_value: Option<OsString>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

/// Load and validate the configuration.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = resolve_config_path(path, std::env::var_os(CONFIG_PATH_ENV));
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound {
                hint: format!(
                    "Create '{DEFAULT_CONFIG_FILE}' in the working directory \
                     or set {CONFIG_PATH_ENV} to the configuration file location."
                ),
                path,
            });
        }
        Err(e) => {
            return Err(ConfigError::Parse {
                path,
                reason: e.to_string(),
            });
        }
    };
    Config::from_toml_str(&contents, &path)
}

/// Read the LlamaParse API key from the environment.
pub fn api_key_from_env() -> Result<String, ConfigError> {
    match std::env::var(LLAMA_API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::MissingApiKey(LLAMA_API_KEY_ENV)),
    }
}
