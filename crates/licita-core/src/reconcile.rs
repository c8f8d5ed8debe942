//! Repairing incomplete rows and merging new records by identifier.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::models::{Dataset, FetchOutcome, Record, Row};
use crate::pacing::PacingState;
use crate::sync::FetchTally;
use crate::traits::TenderSource;

/// Re-fetches every row that lacks a product summary.
///
/// Only `Found` outcomes touch the row, and then only the columns a record
/// carries. Rows with a blank identifier are skipped, since there is nothing
/// to look up.
pub async fn repair<S>(dataset: &mut Dataset, source: &S, pacing: &mut PacingState) -> FetchTally
where
    S: TenderSource + ?Sized,
{
    let mut tally = FetchTally::default();
    let pending: Vec<usize> = dataset
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.is_incomplete() && !row.id().is_empty())
        .map(|(idx, _)| idx)
        .collect();

    if pending.is_empty() {
        return tally;
    }
    info!("Repairing {} incomplete rows...", pending.len());

    for (n, idx) in pending.iter().enumerate() {
        let row = &mut dataset.rows[*idx];
        let id = row.id().to_string();
        let outcome = source.fetch_detail(&id, pacing).await;
        tally.record(&outcome);
        match outcome {
            FetchOutcome::Found(record) => {
                row.apply(&record);
                debug!("[{}/{}] repaired {}", n + 1, pending.len(), id);
            }
            FetchOutcome::Empty => debug!("[{}/{}] {} has no detail", n + 1, pending.len(), id),
            FetchOutcome::Failed => debug!("[{}/{}] {} failed", n + 1, pending.len(), id),
        }
        pacing.pause().await;
    }

    tally
}

/// Appends `new_records` and keeps only the last row of each identifier.
///
/// Survivors keep the relative order of their last occurrence.
pub fn merge(mut dataset: Dataset, new_records: &[Record]) -> Dataset {
    dataset.rows.extend(new_records.iter().map(Row::from));
    dedup_last_wins(dataset)
}

/// Drops every row whose identifier appears again later in the dataset.
pub fn dedup_last_wins(dataset: Dataset) -> Dataset {
    let mut last: HashMap<&str, usize> = HashMap::with_capacity(dataset.len());
    for (idx, row) in dataset.rows.iter().enumerate() {
        last.insert(row.id(), idx);
    }
    let keep: Vec<bool> = dataset
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| last.get(row.id()) == Some(&idx))
        .collect();

    let rows = dataset
        .rows
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();
    Dataset::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fixtures, Column};
    use crate::testing::FakeSource;

    fn ids(dataset: &Dataset) -> Vec<&str> {
        dataset.ids().collect()
    }

    #[test]
    fn test_merge_empty_is_identity() {
        let dataset = Dataset::new(vec![
            fixtures::row("A", "p", ""),
            fixtures::row("B", "", "2024-01-01"),
        ]);
        assert_eq!(merge(dataset.clone(), &[]), dataset);
    }

    #[test]
    fn test_merge_appends_new() {
        let dataset = Dataset::new(vec![fixtures::row("1001-2024", "(10) Widgets", "")]);
        let merged = merge(dataset, &[fixtures::record("2002-2024")]);
        assert_eq!(ids(&merged), vec!["1001-2024", "2002-2024"]);
    }

    #[test]
    fn test_merge_last_wins() {
        let dataset = Dataset::new(vec![
            fixtures::row("A", "old", ""),
            fixtures::row("B", "b", ""),
        ]);
        let mut first = fixtures::record("A");
        first.title = "first".to_string();
        let mut second = fixtures::record("A");
        second.title = "second".to_string();

        let merged = merge(dataset, &[first, second]);
        assert_eq!(ids(&merged), vec!["B", "A"]);
        assert_eq!(merged.rows[1].get(Column::Title), "second");
    }

    #[test]
    fn test_dedup_matches_trimmed_ids() {
        let dataset = Dataset::new(vec![
            fixtures::row(" A ", "first", ""),
            fixtures::row("A", "second", ""),
        ]);
        let deduped = dedup_last_wins(dataset);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped.rows[0].get(Column::Products), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repair_fills_incomplete_row() {
        let mut fetched = fixtures::record("1001-2024");
        fetched.products = "(10) Widgets".to_string();
        let source = FakeSource::new().with_detail(fetched);

        let mut row = fixtures::row("1001-2024", "", "");
        row.set(Column::Priority, "alta");
        let mut dataset = Dataset::new(vec![row]);
        let mut pacing = PacingState::default();

        let tally = repair(&mut dataset, &source, &mut pacing).await;

        assert_eq!(tally.found, 1);
        assert_eq!(dataset.rows[0].get(Column::Products), "(10) Widgets");
        assert_eq!(dataset.rows[0].id(), "1001-2024");
        assert_eq!(dataset.rows[0].get(Column::Priority), "alta");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repair_leaves_row_on_empty_or_failed() {
        let source = FakeSource::new()
            .with_outcome("A", FetchOutcome::Empty)
            .with_outcome("B", FetchOutcome::Failed);
        let original = Dataset::new(vec![
            fixtures::row("A", "", "2030-01-01"),
            fixtures::row("B", " ", ""),
        ]);
        let mut dataset = original.clone();
        let mut pacing = PacingState::default();

        let tally = repair(&mut dataset, &source, &mut pacing).await;

        assert_eq!(dataset, original);
        assert_eq!(tally.empty, 1);
        assert_eq!(tally.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repair_skips_complete_and_blank_id_rows() {
        let source = FakeSource::new();
        let mut dataset = Dataset::new(vec![
            fixtures::row("A", "(1) Sillas", ""),
            fixtures::row("", "", "2030-01-01"),
        ]);
        let mut pacing = PacingState::default();

        let tally = repair(&mut dataset, &source, &mut pacing).await;

        assert_eq!(tally.total(), 0);
        assert!(source.fetched().is_empty());
    }
}
