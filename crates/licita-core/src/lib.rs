//! Licita Core - Domain types, reconciliation and the sync pipeline.
//!
//! The pipeline keeps a spreadsheet of public tenders in step with the
//! Mercado Publico registry:
//!
//! 1. [`reconcile::repair`] re-fetches rows missing their product summary.
//! 2. [`discovery::discover`] scans the last few listing days for new tenders.
//! 3. [`reconcile::merge`] appends them, last write wins per identifier.
//! 4. [`expiry::filter_expired`] drops tenders already closed in registry time.
//!
//! I/O lives behind [`TenderSource`] and [`DatasetStore`].

pub mod config;
pub mod dates;
pub mod discovery;
pub mod error;
pub mod expiry;
pub mod models;
pub mod pacing;
pub mod reconcile;
pub mod retry;
pub mod sync;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    default_config_path, load_settings, HttpConfig, PacingConfig, Settings, SyncConfig,
};
pub use error::AppError;
pub use models::{Column, Dataset, FetchOutcome, ListingSummary, Record, Row, Table};
pub use pacing::PacingState;
pub use retry::{fetch_with_retry, Attempt};
pub use sync::{DatasetSummary, FetchTally, SyncOptions, SyncPipeline, SyncReport};
pub use traits::{DatasetStore, TenderSource};
