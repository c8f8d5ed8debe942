//! Adaptive inter-request delay shared by every fetch in a run.

use std::time::Duration;

use crate::config::PacingConfig;

/// Current delay between upstream calls, kept within the configured bounds.
///
/// Successful responses shrink it geometrically, rate-limit responses grow it
/// linearly. One value lives for a whole sync run and is threaded by `&mut`
/// through every fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingState {
    delay_secs: f64,
    config: PacingConfig,
}

impl Default for PacingState {
    fn default() -> Self {
        Self::new(PacingConfig::default())
    }
}

impl PacingState {
    pub fn new(config: PacingConfig) -> Self {
        let delay_secs = config
            .initial_secs
            .clamp(config.floor_secs, config.ceiling_secs);
        Self { delay_secs, config }
    }

    /// Fixed starting value, for tests and tools that want a known delay.
    pub fn with_delay(config: PacingConfig, delay_secs: f64) -> Self {
        Self {
            delay_secs: delay_secs.clamp(config.floor_secs, config.ceiling_secs),
            config,
        }
    }

    pub fn delay_secs(&self) -> f64 {
        self.delay_secs
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs)
    }

    /// Upstream answered 200.
    pub fn on_success(&mut self) {
        self.delay_secs = (self.delay_secs * self.config.decay).max(self.config.floor_secs);
    }

    /// Upstream answered 429.
    pub fn on_rate_limited(&mut self) {
        self.delay_secs =
            (self.delay_secs + self.config.penalty_secs).min(self.config.ceiling_secs);
    }

    /// Sleeps for the current delay. Callers pause after every fetch.
    pub async fn pause(&self) {
        tokio::time::sleep(self.delay()).await;
    }
}
