//! Bounded retry loop for detail fetches.
//!
//! Transport code performs a single request and classifies it as an
//! [`Attempt`]; [`fetch_with_retry`] owns the policy: which attempts are
//! terminal, how long to back off, and how the shared pacing moves.

use std::future::Future;

use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::AppError;
use crate::models::{FetchOutcome, Record};
use crate::pacing::PacingState;

/// Classified result of one HTTP request.
#[derive(Debug)]
pub enum Attempt {
    /// HTTP 200 with a decoded body; `None` when the listing was empty.
    Listing(Option<Record>),
    /// HTTP 200 whose body could not be decoded into a record.
    Undecodable(AppError),
    /// HTTP 429.
    RateLimited,
    /// Any other non-200 status.
    Status(u16),
    /// The request never produced a response (connect, timeout, TLS...).
    Transport(AppError),
}

/// Runs `attempt` until it yields a terminal result or the attempts run out.
///
/// - 200: pacing decays; a record is `Found`, an empty listing is `Empty`.
/// - 429: sleeps the attempt-indexed backoff and raises pacing.
/// - other status: sleeps `status_retry_delay`.
/// - transport error or undecodable 200: sleeps `network_retry_delay`.
///
/// Every non-terminal attempt consumes one try, including its sleep.
pub async fn fetch_with_retry<F, Fut>(
    id: &str,
    http: &HttpConfig,
    pacing: &mut PacingState,
    mut attempt: F,
) -> FetchOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt>,
{
    for n in 0..http.max_attempts {
        let delay = match attempt().await {
            Attempt::Listing(listing) => {
                pacing.on_success();
                return match listing {
                    Some(record) => FetchOutcome::Found(record),
                    None => {
                        debug!("{}: no detail upstream", id);
                        FetchOutcome::Empty
                    }
                };
            }
            Attempt::Undecodable(e) => {
                pacing.on_success();
                debug!("{}: attempt {} undecodable body: {}", id, n + 1, e);
                http.network_retry_delay
            }
            Attempt::RateLimited => {
                pacing.on_rate_limited();
                let backoff = http.rate_limit_delay(n);
                warn!(
                    "{}: rate limited on attempt {}, backing off {:?} (pacing now {:.2}s)",
                    id,
                    n + 1,
                    backoff,
                    pacing.delay_secs()
                );
                backoff
            }
            Attempt::Status(code) => {
                debug!("{}: attempt {} got HTTP {}", id, n + 1, code);
                http.status_retry_delay
            }
            Attempt::Transport(e) => {
                debug!("{}: attempt {} failed: {}", id, n + 1, e);
                http.network_retry_delay
            }
        };
        tokio::time::sleep(delay).await;
    }

    warn!("{}: giving up after {} attempts", id, http.max_attempts);
    FetchOutcome::Failed
}
