//! Configuration types for Licita components.
//!
//! Every value has a hardcoded default matching the upstream's observed rate
//! limits. An optional TOML file can override them:
//!
//! ```toml
//! [sync]
//! days_back = 5
//! timezone = "America/Santiago"
//!
//! [http]
//! timeout_secs = 30
//! rate_limit_backoff_secs = [2, 5, 10]
//!
//! [pacing]
//! ceiling_secs = 5.0
//! ```
//!
//! Secrets (API ticket, sheet id, access token) never live in this file; they
//! come from the environment through the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::AppError;

/// Detail and listing endpoint of the public tender API.
pub const DEFAULT_API_URL: &str =
    "https://api.mercadopublico.cl/servicios/v1/publico/licitaciones.json";

/// HTTP client configuration for the tender API.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    /// Attempts per detail fetch, including the first one.
    pub max_attempts: u32,
    /// Sleep after a 429, indexed by the attempt that was rate limited.
    /// The last entry is reused if there are more attempts than entries.
    pub rate_limit_backoff: Vec<Duration>,
    /// Sleep after any other non-200 status.
    pub status_retry_delay: Duration,
    /// Sleep after a transport error or an undecodable body.
    pub network_retry_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: "Mozilla/5.0".to_string(),
            max_attempts: 3,
            rate_limit_backoff: vec![
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            status_retry_delay: Duration::from_secs(2),
            network_retry_delay: Duration::from_secs(1),
        }
    }
}

impl HttpConfig {
    /// Backoff to apply after a 429 on the given zero-based attempt.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.rate_limit_backoff.len().saturating_sub(1));
        self.rate_limit_backoff
            .get(idx)
            .copied()
            .unwrap_or(self.status_retry_delay)
    }
}

/// Bounds and step sizes for the adaptive inter-request delay.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    pub initial_secs: f64,
    pub floor_secs: f64,
    pub ceiling_secs: f64,
    /// Multiplier applied after every HTTP 200.
    pub decay: f64,
    /// Added after every HTTP 429.
    pub penalty_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            initial_secs: 0.2,
            floor_secs: 0.2,
            ceiling_secs: 3.0,
            decay: 0.95,
            penalty_secs: 0.5,
        }
    }
}

/// Portal synchronization configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Trailing window scanned for new tenders, today included.
    pub days_back: u32,
    /// Civil timezone of the registry; anchors "today" and expiry.
    pub timezone: Tz,
    /// `CodigoEstado` of a published tender.
    pub published_status: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            days_back: 3,
            timezone: chrono_tz::America::Santiago,
            published_status: 5,
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub http: HttpConfig,
    pub pacing: PacingConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    sync: SyncSection,
    http: HttpSection,
    pacing: PacingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SyncSection {
    days_back: Option<u32>,
    timezone: Option<String>,
    published_status: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HttpSection {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
    max_attempts: Option<u32>,
    rate_limit_backoff_secs: Option<Vec<u64>>,
    status_retry_delay_secs: Option<u64>,
    network_retry_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PacingSection {
    initial_secs: Option<f64>,
    floor_secs: Option<f64>,
    ceiling_secs: Option<f64>,
    decay: Option<f64>,
    penalty_secs: Option<f64>,
}

/// Default location of the optional config file: `<config_dir>/licita/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("licita").join("config.toml"))
}

/// Loads settings from `path`, or from [`default_config_path`] when `None`.
///
/// A missing file yields the defaults. An explicitly given path must exist.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, AppError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(Settings::default()),
        },
    };

    if !path.exists() {
        if explicit {
            return Err(AppError::ConfigError(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| {
        AppError::ConfigError(format!("cannot read {}: {}", path.display(), e))
    })?;
    tracing::debug!("Loaded config from {}", path.display());
    parse_settings(&content)
}

/// Parses TOML content on top of the defaults.
pub fn parse_settings(content: &str) -> Result<Settings, AppError> {
    let file: ConfigFile = toml::from_str(content)?;
    let mut settings = Settings::default();

    if let Some(days) = file.sync.days_back {
        settings.sync.days_back = days;
    }
    if let Some(tz) = file.sync.timezone {
        settings.sync.timezone = tz
            .parse::<Tz>()
            .map_err(|e| AppError::ConfigError(format!("unknown timezone '{}': {}", tz, e)))?;
    }
    if let Some(code) = file.sync.published_status {
        settings.sync.published_status = code;
    }

    let http = &mut settings.http;
    if let Some(url) = file.http.base_url {
        http.base_url = url;
    }
    if let Some(secs) = file.http.timeout_secs {
        http.timeout = Duration::from_secs(secs);
    }
    if let Some(ua) = file.http.user_agent {
        http.user_agent = ua;
    }
    if let Some(n) = file.http.max_attempts {
        http.max_attempts = n;
    }
    if let Some(schedule) = file.http.rate_limit_backoff_secs {
        http.rate_limit_backoff = schedule.into_iter().map(Duration::from_secs).collect();
    }
    if let Some(secs) = file.http.status_retry_delay_secs {
        http.status_retry_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = file.http.network_retry_delay_secs {
        http.network_retry_delay = Duration::from_secs(secs);
    }

    let pacing = &mut settings.pacing;
    if let Some(v) = file.pacing.initial_secs {
        pacing.initial_secs = v;
    }
    if let Some(v) = file.pacing.floor_secs {
        pacing.floor_secs = v;
    }
    if let Some(v) = file.pacing.ceiling_secs {
        pacing.ceiling_secs = v;
    }
    if let Some(v) = file.pacing.decay {
        pacing.decay = v;
    }
    if let Some(v) = file.pacing.penalty_secs {
        pacing.penalty_secs = v;
    }

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    /// Rejects combinations the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.http.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "http.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.http.rate_limit_backoff.is_empty() {
            return Err(AppError::ConfigError(
                "http.rate_limit_backoff_secs must not be empty".to_string(),
            ));
        }
        let p = &self.pacing;
        if !(p.floor_secs >= 0.0 && p.floor_secs <= p.ceiling_secs) {
            return Err(AppError::ConfigError(format!(
                "pacing floor {} must be within [0, ceiling {}]",
                p.floor_secs, p.ceiling_secs
            )));
        }
        if !(p.decay > 0.0 && p.decay <= 1.0) {
            return Err(AppError::ConfigError(format!(
                "pacing decay {} must be in (0, 1]",
                p.decay
            )));
        }
        if p.penalty_secs < 0.0 {
            return Err(AppError::ConfigError(
                "pacing penalty must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
