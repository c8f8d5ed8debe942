//! Sync orchestration: load → repair → discover → merge → expire → persist.
//!
//! The pipeline only talks to the outside world through [`TenderSource`] and
//! [`DatasetStore`]. Store faults are the only errors it returns; everything
//! upstream is folded into the counts of the [`SyncReport`].

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::info;

use crate::config::Settings;
use crate::dates::{local_naive, normalize};
use crate::discovery::{discover, DiscoveryStats};
use crate::error::AppError;
use crate::expiry::{filter_expired, is_expired};
use crate::models::{Column, Dataset, FetchOutcome};
use crate::pacing::PacingState;
use crate::reconcile::{merge, repair};
use crate::traits::{DatasetStore, TenderSource};

/// Counts of detail-fetch outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchTally {
    pub found: usize,
    pub empty: usize,
    pub failed: usize,
}

impl FetchTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Found(_) => self.found += 1,
            FetchOutcome::Empty => self.empty += 1,
            FetchOutcome::Failed => self.failed += 1,
        }
    }

    /// Returns the total number of fetches.
    pub fn total(&self) -> usize {
        self.found + self.empty + self.failed
    }
}

/// Everything a run did, for logging and the CLI summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub loaded: usize,
    pub repair: FetchTally,
    pub discovery: DiscoveryStats,
    pub new_records: usize,
    pub duplicates_dropped: usize,
    pub expired: usize,
    pub final_rows: usize,
    /// Registry-local time the expiry filter compared against.
    pub reference: Option<NaiveDateTime>,
    pub persisted: bool,
}

/// Options for a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Run every phase but leave the store untouched.
    pub dry_run: bool,
}

/// Drives one sync run against a source and a store.
pub struct SyncPipeline<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    store: &'a D,
    settings: &'a Settings,
    clock: fn() -> DateTime<Utc>,
}

impl<'a, S, D> SyncPipeline<'a, S, D>
where
    S: TenderSource + ?Sized,
    D: DatasetStore + ?Sized,
{
    pub fn new(source: &'a S, store: &'a D, settings: &'a Settings) -> Self {
        Self {
            source,
            store,
            settings,
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock, e.g. to pin "today" in tests.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn registry_now(&self) -> NaiveDateTime {
        local_naive((self.clock)(), self.settings.sync.timezone)
    }

    /// Runs every phase.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreError` (or whatever the store reports) when the
    /// dataset cannot be loaded or persisted. Nothing is written after a
    /// failed load.
    pub async fn run(&self, options: SyncOptions) -> Result<SyncReport, AppError> {
        let table = self.store.load().await?;
        let mut dataset = Dataset::from_table(&table);
        let loaded = dataset.len();
        info!("Loaded {} rows from {}", loaded, self.store.label());

        let mut pacing = PacingState::new(self.settings.pacing.clone());

        let repair_tally = repair(&mut dataset, self.source, &mut pacing).await;
        if repair_tally.total() > 0 {
            info!(
                "Repair complete: {} repaired, {} without detail, {} failed",
                repair_tally.found, repair_tally.empty, repair_tally.failed
            );
        }

        let mut known: HashSet<String> = dataset
            .ids()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        let today = self.registry_now().date();
        info!(
            "Looking for new tenders over the last {} days...",
            self.settings.sync.days_back
        );
        let (new_records, discovery) = discover(
            self.source,
            &mut known,
            today,
            &self.settings.sync,
            &mut pacing,
        )
        .await;
        if !new_records.is_empty() {
            info!("+{} new tenders", new_records.len());
        }

        let before_merge = dataset.len() + new_records.len();
        let dataset = merge(dataset, &new_records);
        let duplicates_dropped = before_merge - dataset.len();

        let mut report = SyncReport {
            loaded,
            repair: repair_tally,
            discovery,
            new_records: new_records.len(),
            duplicates_dropped,
            expired: 0,
            final_rows: dataset.len(),
            reference: None,
            persisted: false,
        };

        if dataset.is_empty() {
            info!("Dataset is empty, nothing to persist");
            return Ok(report);
        }

        let reference = self.registry_now();
        info!(
            "Reference time ({}): {}",
            self.settings.sync.timezone,
            reference.format("%d-%m-%Y %H:%M")
        );
        let (dataset, expired) = filter_expired(dataset, reference);
        if expired > 0 {
            info!("Removed {} expired tenders", expired);
        } else {
            info!("No expired tenders");
        }
        report.expired = expired;
        report.final_rows = dataset.len();
        report.reference = Some(reference);

        if options.dry_run {
            info!("Dry run: {} rows not written", dataset.len());
            return Ok(report);
        }

        self.store.save(&dataset.to_table()).await?;
        info!("Wrote {} rows to {}", dataset.len(), self.store.label());
        report.persisted = true;
        Ok(report)
    }

    /// Applies only the expiry filter to the stored dataset.
    pub async fn prune(&self, options: SyncOptions) -> Result<SyncReport, AppError> {
        let table = self.store.load().await?;
        let dataset = Dataset::from_table(&table);
        let loaded = dataset.len();
        let reference = self.registry_now();
        let (dataset, expired) = filter_expired(dataset, reference);

        let mut report = SyncReport {
            loaded,
            repair: FetchTally::default(),
            discovery: DiscoveryStats::default(),
            new_records: 0,
            duplicates_dropped: 0,
            expired,
            final_rows: dataset.len(),
            reference: Some(reference),
            persisted: false,
        };

        if options.dry_run || expired == 0 {
            return Ok(report);
        }
        self.store.save(&dataset.to_table()).await?;
        report.persisted = true;
        Ok(report)
    }
}

/// Health figures of a dataset at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub rows: usize,
    pub incomplete: usize,
    pub expired: usize,
    pub unknown_closing: usize,
    pub duplicate_ids: usize,
}

impl DatasetSummary {
    pub fn of(dataset: &Dataset, reference: NaiveDateTime) -> Self {
        let mut seen = HashSet::new();
        let mut summary = Self {
            rows: dataset.len(),
            incomplete: 0,
            expired: 0,
            unknown_closing: 0,
            duplicate_ids: 0,
        };
        for row in &dataset.rows {
            if row.is_incomplete() {
                summary.incomplete += 1;
            }
            if normalize(row.get(Column::ClosingDate)).is_none() {
                summary.unknown_closing += 1;
            } else if is_expired(row, reference) {
                summary.expired += 1;
            }
            if !seen.insert(row.id()) {
                summary.duplicate_ids += 1;
            }
        }
        summary
    }
}
