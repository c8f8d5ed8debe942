//! In-memory fakes for the pipeline seams.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{FetchOutcome, ListingSummary, Record, Table};
use crate::pacing::PacingState;
use crate::traits::{DatasetStore, TenderSource};

#[derive(Default)]
pub struct FakeSource {
    details: HashMap<String, FetchOutcome>,
    listings: HashMap<NaiveDate, Vec<ListingSummary>>,
    failing_days: Vec<NaiveDate>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detail(mut self, record: Record) -> Self {
        self.details
            .insert(record.id.clone(), FetchOutcome::Found(record));
        self
    }

    pub fn with_outcome(mut self, id: &str, outcome: FetchOutcome) -> Self {
        self.details.insert(id.to_string(), outcome);
        self
    }

    pub fn with_listing(mut self, date: NaiveDate, entries: Vec<(&str, i64)>) -> Self {
        let summaries = entries
            .into_iter()
            .map(|(code, status)| ListingSummary {
                codigo_externo: code.to_string(),
                codigo_estado: status,
            })
            .collect();
        self.listings.insert(date, summaries);
        self
    }

    pub fn with_failing_day(mut self, date: NaiveDate) -> Self {
        self.failing_days.push(date);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl TenderSource for FakeSource {
    async fn fetch_detail(&self, id: &str, pacing: &mut PacingState) -> FetchOutcome {
        self.fetched.lock().unwrap().push(id.to_string());
        let outcome = self
            .details
            .get(id)
            .cloned()
            .unwrap_or(FetchOutcome::Empty);
        if !matches!(outcome, FetchOutcome::Failed) {
            pacing.on_success();
        }
        outcome
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<ListingSummary>, AppError> {
        if self.failing_days.contains(&date) {
            return Err(AppError::NetworkError("listing unreachable".to_string()));
        }
        Ok(self.listings.get(&date).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub table: Mutex<Table>,
    pub saves: Mutex<usize>,
    pub fail_load: bool,
    pub fail_save: bool,
}

impl MemoryStore {
    pub fn with_table(table: Table) -> Self {
        Self {
            table: Mutex::new(table),
            ..Default::default()
        }
    }

    pub fn table(&self) -> Table {
        self.table.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    fn label(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<Table, AppError> {
        if self.fail_load {
            return Err(AppError::StoreError("load refused".to_string()));
        }
        Ok(self.table())
    }

    async fn save(&self, table: &Table) -> Result<(), AppError> {
        if self.fail_save {
            return Err(AppError::StoreError("save refused".to_string()));
        }
        *self.table.lock().unwrap() = table.clone();
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}
