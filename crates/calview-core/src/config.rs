use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable holding a Microsoft Graph bearer token.
pub const GRAPH_TOKEN_ENV: &str = "CALVIEW_GRAPH_TOKEN";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Microsoft Graph endpoint and credential
    #[serde(default)]
    pub graph: GraphConfig,

    /// Client-side request quota
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry and backoff policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Event loading and placeholder data
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Base URL of the Microsoft Graph API
    pub base_url: String,

    /// Bearer token for Graph (optional, usually set via environment).
    ///
    /// Never written back to disk.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            access_token: std::env::var(GRAPH_TOKEN_ENV).ok(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: u32,
    /// Window length in milliseconds
    #[serde(default = "default_window_duration_ms")]
    pub window_duration_ms: u64,
}

fn default_max_requests_per_window() -> u32 {
    30
}

fn default_window_duration_ms() -> u64 {
    60_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: default_max_requests_per_window(),
            window_duration_ms: default_window_duration_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per fetch, including the first one
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Upper bound for a single backoff wait
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Upper bound for the random jitter added to each wait
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
    /// Growth factor applied per attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Wait used when a 429 arrives without a Retry-After header
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
    /// Base wait for connection failures and 5xx responses
    #[serde(default = "default_transient_base_delay_ms")]
    pub transient_base_delay_ms: u64,
    /// Retry connection failures and 5xx responses (otherwise they fail immediately)
    #[serde(default = "default_retry_transient_errors")]
    pub retry_transient_errors: bool,
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_jitter_max_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retry_after_secs() -> u64 {
    15
}

fn default_transient_base_delay_ms() -> u64 {
    1_000
}

fn default_retry_transient_errors() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            backoff_cap_ms: default_backoff_cap_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            default_retry_after_secs: default_retry_after_secs(),
            transient_base_delay_ms: default_transient_base_delay_ms(),
            retry_transient_errors: default_retry_transient_errors(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Months loaded on each side of the focused date (default: 6)
    #[serde(default = "default_range_months")]
    pub range_months: u32,
    /// Number of placeholder events generated when live data is unavailable
    #[serde(default = "default_placeholder_count")]
    pub placeholder_count: usize,
}

fn default_range_months() -> u32 {
    6
}

fn default_placeholder_count() -> usize {
    20
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            range_months: default_range_months(),
            placeholder_count: default_placeholder_count(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calview");

        Self {
            config_dir,
            graph: GraphConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if the file is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        if config.graph.access_token.is_none() {
            config.graph.access_token = std::env::var(GRAPH_TOKEN_ENV).ok();
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load_validated_from(&Self::config_path()?)
    }

    /// [`Self::load_validated`] for an explicit path
    pub fn load_validated_from(path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.graph.base_url, "graph.base_url", &mut result);

        if self.graph.access_token.is_none() {
            result.add_warning(
                "graph.access_token",
                format!(
                    "No Graph token configured (set {}); placeholder events will be shown",
                    GRAPH_TOKEN_ENV
                ),
            );
        }

        if self.rate_limit.max_requests_per_window == 0 {
            result.add_error(
                "rate_limit.max_requests_per_window",
                "At least one request per window must be allowed",
            );
        }
        if self.rate_limit.window_duration_ms == 0 {
            result.add_error(
                "rate_limit.window_duration_ms",
                "Window duration must be greater than 0",
            );
        }

        if self.retry.max_retry_attempts == 0 {
            result.add_error(
                "retry.max_retry_attempts",
                "At least one attempt is required",
            );
        } else if self.retry.max_retry_attempts > 10 {
            result.add_warning(
                "retry.max_retry_attempts",
                "More than 10 attempts will keep the calendar loading for a long time",
            );
        }

        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            result.add_error(
                "retry.backoff_multiplier",
                "Backoff multiplier must be a finite number >= 1.0",
            );
        }

        if self.retry.backoff_cap_ms == 0 {
            result.add_error("retry.backoff_cap_ms", "Backoff cap must be greater than 0");
        } else if self.retry.jitter_max_ms > self.retry.backoff_cap_ms {
            result.add_warning(
                "retry.jitter_max_ms",
                "Jitter is larger than the backoff cap and will be clipped",
            );
        }

        if self.retry.default_retry_after_secs == 0 {
            result.add_warning(
                "retry.default_retry_after_secs",
                "Rate-limited requests without Retry-After will be retried without waiting",
            );
        }

        if self.events.range_months == 0 {
            result.add_warning(
                "events.range_months",
                "Only the focused month boundary will be loaded (0 months)",
            );
        }
        if self.events.placeholder_count == 0 {
            result.add_warning(
                "events.placeholder_count",
                "Placeholder data disabled (0 events)",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("no platform config directory".into()))?
            .join("calview");

        Ok(config_dir.join("config.toml"))
    }
}
