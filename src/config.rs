use chrono::{DateTime, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::error::PaddockError;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Championship year the watchers follow
    pub season: i32,
    #[serde(default)]
    pub clock: ClockConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub watchers: WatcherConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Simulated clock settings. Fixed at process start.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// Frozen "now" (RFC 3339). Takes precedence over everything else.
    #[serde(default)]
    pub fixed_now: Option<String>,
    /// Logical start instant (RFC 3339) for accelerated replays
    #[serde(default)]
    pub anchor: Option<String>,
    /// Logical seconds per real second
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            fixed_now: None,
            anchor: None,
            multiplier: 1.0,
        }
    }
}

impl ClockConfig {
    pub fn parsed_fixed_now(&self) -> Result<Option<DateTime<Utc>>, String> {
        parse_instant("clock.fixed_now", self.fixed_now.as_deref())
    }

    pub fn parsed_anchor(&self) -> Result<Option<DateTime<Utc>>, String> {
        parse_instant("clock.anchor", self.anchor.as_deref())
    }
}

fn parse_instant(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| format!("{field} is not a valid RFC 3339 timestamp ({s}): {e}")),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    /// Ergast-compatible API root
    #[serde(default = "default_calendar_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Hours after race start before results are considered published
    #[serde(default = "default_results_delay")]
    pub results_delay_hours: i64,
    /// Days before the following event's race that the cache rolls over
    #[serde(default = "default_refresh_lead")]
    pub refresh_lead_days: i64,
}

fn default_calendar_url() -> String {
    "https://api.jolpi.ca/ergast/f1".to_string()
}

fn default_request_timeout() -> u64 {
    20
}

fn default_results_delay() -> i64 {
    12
}

fn default_refresh_lead() -> i64 {
    5
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: default_calendar_url(),
            request_timeout_secs: default_request_timeout(),
            results_delay_hours: default_results_delay(),
            refresh_lead_days: default_refresh_lead(),
        }
    }
}

/// Watcher intervals, all expressed in logical (simulated) seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Cache watcher: re-check interval when no refresh is scheduled
    pub cache_poll_secs: u64,
    /// Backoff after a transient failure (timeout, database hiccup, data lag)
    pub retry_backoff_secs: u64,
    /// Backoff after an error a quick retry will not fix (bad calendar data, config)
    pub error_backoff_secs: u64,
    /// Minimum gap between two immediate cache refreshes
    pub min_refresh_gap_secs: u64,
    /// Results watcher: longest single sleep before re-deriving the target
    pub results_recheck_secs: u64,
    /// Results watcher: sleep when the calendar has nothing left to wait for
    pub results_idle_secs: u64,
    /// Backoff when the outcome is not published yet
    pub outcome_backoff_secs: u64,
    /// Backoff after one or more tenants failed to score
    pub scoring_retry_secs: u64,
    /// Hours after the final race start before standings are fetched
    pub season_grace_hours: i64,
    /// Number of guarded attempts to fetch final standings
    pub season_attempts: u32,
    pub season_backoff_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            cache_poll_secs: 3600,
            retry_backoff_secs: 60,
            error_backoff_secs: 21_600,
            min_refresh_gap_secs: 60,
            results_recheck_secs: 600,
            results_idle_secs: 86_400,
            outcome_backoff_secs: 3600,
            scoring_retry_secs: 3600,
            season_grace_hours: 12,
            season_attempts: 3,
            season_backoff_secs: 3600,
        }
    }
}

impl WatcherConfig {
    /// How long a loop should back off after `err`.
    pub fn backoff_after(&self, err: &PaddockError, transient_secs: u64) -> u64 {
        if err.is_transient() {
            transient_secs
        } else {
            self.error_backoff_secs.max(transient_secs)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Points for calling the weekend's top-scoring constructor
    #[serde(default = "default_constructor_points")]
    pub constructor_points: i32,
    /// Points per moderator-confirmed bold prediction
    #[serde(default = "default_bold_bonus")]
    pub bold_bonus_points: i32,
}

fn default_constructor_points() -> i32 {
    3
}

fn default_bold_bonus() -> i32 {
    10
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            constructor_points: default_constructor_points(),
            bold_bonus_points: default_bold_bonus(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("clock.multiplier", 1.0)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PADDOCK_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (PADDOCK_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("PADDOCK")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.clock.multiplier.is_finite() && self.clock.multiplier > 0.0) {
            errors.push(format!(
                "clock.multiplier must be positive, got {}",
                self.clock.multiplier
            ));
        }
        if let Err(e) = self.clock.parsed_fixed_now() {
            errors.push(e);
        }
        if let Err(e) = self.clock.parsed_anchor() {
            errors.push(e);
        }

        if self.watchers.season_attempts == 0 {
            errors.push("watchers.season_attempts must be at least 1".to_string());
        }
        if self.watchers.results_recheck_secs == 0 || self.watchers.cache_poll_secs == 0 {
            errors.push("watcher polling intervals must be non-zero".to_string());
        }
        if self.calendar.results_delay_hours < 0 {
            errors.push("calendar.results_delay_hours must not be negative".to_string());
        }
        if self.scoring.constructor_points < 0 || self.scoring.bold_bonus_points < 0 {
            errors.push("scoring points must not be negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
