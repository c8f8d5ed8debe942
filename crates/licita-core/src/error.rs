use thiserror::Error;

/// Application-wide error types.
///
/// Only faults at the dataset boundary (loading or persisting the table) are
/// meant to reach the process exit. Per-tender and per-day faults are caught
/// where they happen and downgraded to a [`FetchOutcome`](crate::FetchOutcome)
/// or a skipped discovery day.
///
/// # Error Conversion
///
/// - `serde_json::Error` → `AppError::SerializationError`
/// - `toml::de::Error` → `AppError::ConfigError`
///
/// # Examples
///
/// ```no_run
/// use licita_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::StoreError("sheet not reachable".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// The dataset store could not be read or written.
    ///
    /// Fatal for a sync run: reconciling without a baseline risks mass
    /// duplication, and a failed write must surface to the scheduler.
    #[error("Store error: {0}")]
    StoreError(String),

    /// HTTP client request failed.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration file or environment is unusable.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Upstream answered HTTP 429.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Upstream answered with a non-success status other than 429.
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::StoreError(msg) => {
                if msg.contains("401") || msg.contains("403") {
                    format!(
                        "Spreadsheet access denied: {}\n   Check SHEETS_ACCESS_TOKEN and that the sheet is shared with the account.",
                        msg
                    )
                } else {
                    format!("Cannot reach the dataset store: {}", msg)
                }
            }
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. Mercado Publico may be slow or unreachable.\n   Try again later.".to_string()
                } else if msg.contains("connect") {
                    format!(
                        "Cannot connect to Mercado Publico: {}\n   Check your internet connection.",
                        msg
                    )
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::ConfigError(msg) => {
                format!("Invalid configuration: {}\n   Check your config.toml and environment.", msg)
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::StoreError("boom".to_string());
        assert_eq!(err.to_string(), "Store error: boom");
    }

    #[test]
    fn test_http_status_display() {
        let err = AppError::HttpStatus(503);
        assert_eq!(err.to_string(), "Unexpected HTTP status 503");
        assert_eq!(err.user_message(), "Unexpected HTTP status 503");
    }

    #[test]
    fn test_user_message_store_denied() {
        let err = AppError::StoreError("HTTP 403 from sheets".to_string());
        assert!(err.user_message().contains("access denied"));
    }

    #[test]
    fn test_user_message_rate_limit() {
        let msg = AppError::RateLimitExceeded.user_message();
        assert!(msg.contains("Too many requests"));
    }

    #[test]
    fn test_error_from_serde() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{ invalid json }");
        let app_err: AppError = result.unwrap_err().into();
        assert!(matches!(app_err, AppError::SerializationError(_)));
    }

    #[test]
    fn test_error_from_toml() {
        let result: Result<toml::Value, _> = toml::from_str("days_back = ");
        let app_err: AppError = result.unwrap_err().into();
        assert!(matches!(app_err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_timeout_error() {
        let err = AppError::Timeout(20);
        assert_eq!(err.to_string(), "Request timed out after 20 seconds");
    }
}
