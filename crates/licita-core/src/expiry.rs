//! Removal of tenders whose closing date has passed.

use chrono::NaiveDateTime;

use crate::dates::normalize;
use crate::models::{Column, Dataset, Row};

/// True when the row's closing date is known and not after `reference`.
pub fn is_expired(row: &Row, reference: NaiveDateTime) -> bool {
    match normalize(row.get(Column::ClosingDate)) {
        Some(closing) => closing <= reference,
        None => false,
    }
}

/// Keeps rows closing strictly after `reference`, and rows whose closing
/// date is unknown. Returns the surviving dataset and how many rows it lost.
///
/// `reference` is naive local time in the registry's zone, see
/// [`registry_now`](crate::dates::registry_now).
pub fn filter_expired(dataset: Dataset, reference: NaiveDateTime) -> (Dataset, usize) {
    let before = dataset.len();
    let rows: Vec<Row> = dataset
        .rows
        .into_iter()
        .filter(|row| !is_expired(row, reference))
        .collect();
    let removed = before - rows.len();
    (Dataset::new(rows), removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use chrono::{Duration, NaiveDate};

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn fmt(dt: NaiveDateTime) -> String {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    #[test]
    fn test_one_second_either_side() {
        let now = reference();
        let past = fixtures::row("past", "p", &fmt(now - Duration::seconds(1)));
        let future = fixtures::row("future", "p", &fmt(now + Duration::seconds(1)));
        let (kept, removed) = filter_expired(Dataset::new(vec![past, future]), now);
        assert_eq!(removed, 1);
        assert_eq!(kept.ids().collect::<Vec<_>>(), vec!["future"]);
    }

    #[test]
    fn test_equal_to_reference_is_expired() {
        let now = reference();
        let row = fixtures::row("edge", "p", &fmt(now));
        assert!(is_expired(&row, now));
        let (kept, removed) = filter_expired(Dataset::new(vec![row]), now);
        assert!(kept.is_empty());
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_unknown_dates_always_kept() {
        let rows = vec![
            fixtures::row("blank", "p", ""),
            fixtures::row("nan", "p", "nan"),
            fixtures::row("junk", "p", "por definir"),
        ];
        for reference in [
            NaiveDateTime::MIN,
            reference(),
            NaiveDateTime::MAX,
        ] {
            let (kept, removed) = filter_expired(Dataset::new(rows.clone()), reference);
            assert_eq!(kept.len(), 3);
            assert_eq!(removed, 0);
        }
    }

    #[test]
    fn test_mixed_formats() {
        let now = reference();
        let dataset = Dataset::new(vec![
            fixtures::row("iso", "p", "2024-06-10T11:59:59"),
            fixtures::row("dayfirst", "p", "11-06-2024 00:00:00"),
            fixtures::row("dateonly", "p", "2024-06-10"),
        ]);
        let (kept, removed) = filter_expired(dataset, now);
        assert_eq!(removed, 2);
        assert_eq!(kept.ids().collect::<Vec<_>>(), vec!["dayfirst"]);
    }
}
