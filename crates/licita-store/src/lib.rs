//! Licita Store - where the tender table lives between runs.
//!
//! - [`SheetsStore`]: first worksheet of a Google spreadsheet.
//! - [`JsonFileStore`]: a JSON table file on disk.

pub mod file;
pub mod sheets;

pub use file::JsonFileStore;
pub use sheets::SheetsStore;
