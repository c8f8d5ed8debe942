//! Scanning the trailing window of listing days for new published tenders.

use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::dates::listing_date_param;
use crate::models::{FetchOutcome, Record};
use crate::pacing::PacingState;
use crate::sync::FetchTally;
use crate::traits::TenderSource;

/// Counts from one discovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub days_scanned: usize,
    pub days_failed: usize,
    pub candidates: usize,
    pub fetches: FetchTally,
}

/// Walks `config.days_back` days backwards from `today` and fetches every
/// published tender not yet in `known`.
///
/// Each day's candidates are fixed when its listing arrives; ids accepted on
/// that day join `known`, so later days will not pick them up again. A day
/// whose listing fails is logged and skipped.
pub async fn discover<S>(
    source: &S,
    known: &mut HashSet<String>,
    today: NaiveDate,
    config: &SyncConfig,
    pacing: &mut PacingState,
) -> (Vec<Record>, DiscoveryStats)
where
    S: TenderSource + ?Sized,
{
    let mut stats = DiscoveryStats::default();
    let mut found = Vec::new();

    for offset in 0..config.days_back {
        let Some(date) = today.checked_sub_days(Days::new(u64::from(offset))) else {
            break;
        };
        let label = listing_date_param(date);
        stats.days_scanned += 1;

        let listing = match source.list_by_date(date).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Listing for {} unavailable, skipping day: {}", label, e);
                stats.days_failed += 1;
                continue;
            }
        };

        let candidates: Vec<String> = listing
            .into_iter()
            .filter(|s| s.codigo_estado == config.published_status)
            .map(|s| s.codigo_externo.trim().to_string())
            .filter(|code| !code.is_empty() && !known.contains(code))
            .collect();

        if candidates.is_empty() {
            continue;
        }
        info!("{}: {} new candidates", label, candidates.len());
        stats.candidates += candidates.len();

        for code in candidates {
            let outcome = source.fetch_detail(&code, pacing).await;
            stats.fetches.record(&outcome);
            if let FetchOutcome::Found(record) = outcome {
                known.insert(code);
                found.push(record);
            }
            pacing.pause().await;
        }
    }

    (found, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use crate::testing::FakeSource;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn config(days_back: u32) -> SyncConfig {
        SyncConfig {
            days_back,
            ..SyncConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_day_single_candidate() {
        let source = FakeSource::new()
            .with_listing(day(10), vec![("2002-2024", 5)])
            .with_detail(fixtures::record("2002-2024"));
        let mut known: HashSet<String> = ["1001-2024".to_string()].into();
        let mut pacing = PacingState::default();

        let (records, stats) = discover(&source, &mut known, day(10), &config(1), &mut pacing).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "2002-2024");
        assert!(known.contains("2002-2024"));
        assert_eq!(stats.days_scanned, 1);
        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.fetches.found, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_status_and_known() {
        let source = FakeSource::new()
            .with_listing(
                day(10),
                vec![("1001-2024", 5), ("3003-2024", 8), ("4004-2024", 5)],
            )
            .with_detail(fixtures::record("4004-2024"));
        let mut known: HashSet<String> = ["1001-2024".to_string()].into();
        let mut pacing = PacingState::default();

        let (records, _) = discover(&source, &mut known, day(10), &config(1), &mut pacing).await;

        assert_eq!(records.len(), 1);
        assert_eq!(source.fetched(), vec!["4004-2024".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_ids_block_later_days() {
        let source = FakeSource::new()
            .with_listing(day(10), vec![("2002-2024", 5)])
            .with_listing(day(9), vec![("2002-2024", 5)])
            .with_detail(fixtures::record("2002-2024"));
        let mut known = HashSet::new();
        let mut pacing = PacingState::default();

        let (records, stats) = discover(&source, &mut known, day(10), &config(2), &mut pacing).await;

        assert_eq!(records.len(), 1);
        assert_eq!(stats.days_scanned, 2);
        assert_eq!(source.fetched().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfound_candidates_stay_unknown() {
        let source = FakeSource::new()
            .with_listing(day(10), vec![("2002-2024", 5)])
            .with_listing(day(9), vec![("2002-2024", 5)])
            .with_outcome("2002-2024", FetchOutcome::Failed);
        let mut known = HashSet::new();
        let mut pacing = PacingState::default();

        let (records, stats) = discover(&source, &mut known, day(10), &config(2), &mut pacing).await;

        assert!(records.is_empty());
        assert!(known.is_empty());
        assert_eq!(stats.fetches.failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_day_is_skipped() {
        let source = FakeSource::new()
            .with_failing_day(day(10))
            .with_listing(day(9), vec![("2002-2024", 5)])
            .with_detail(fixtures::record("2002-2024"));
        let mut known = HashSet::new();
        let mut pacing = PacingState::default();

        let (records, stats) = discover(&source, &mut known, day(10), &config(3), &mut pacing).await;

        assert_eq!(records.len(), 1);
        assert_eq!(stats.days_scanned, 3);
        assert_eq!(stats.days_failed, 1);
    }
}
