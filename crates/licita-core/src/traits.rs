//! Seams between the pipeline and the outside world.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{FetchOutcome, ListingSummary, Table};
use crate::pacing::PacingState;

/// Upstream tender registry.
#[async_trait]
pub trait TenderSource: Send + Sync {
    /// Fetches and maps the detail of one tender, retrying internally.
    ///
    /// Never fails: exhausted retries are [`FetchOutcome::Failed`]. Every call
    /// may move `pacing`; callers pause for it afterwards.
    async fn fetch_detail(&self, id: &str, pacing: &mut PacingState) -> FetchOutcome;

    /// Lists tenders published on `date`. Single attempt.
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<ListingSummary>, AppError>;
}

/// Where the dataset lives between runs. Read and written wholesale.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Short description for logs, e.g. the sheet id or file path.
    fn label(&self) -> String;

    async fn load(&self) -> Result<Table, AppError>;

    /// Replaces the stored table with `table`.
    async fn save(&self, table: &Table) -> Result<(), AppError>;
}
