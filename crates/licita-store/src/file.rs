//! Local JSON table file, for offline runs and tests against real data.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use licita_core::error::AppError;
use licita_core::models::Table;
use licita_core::traits::DatasetStore;
use tracing::warn;

/// Stores the table as `{"header": [...], "rows": [[...], ...]}`.
///
/// A missing file loads as an empty table. Saves go through a sibling
/// temporary file and a rename, so a crash never leaves half a table behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DatasetStore for JsonFileStore {
    fn label(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn load(&self) -> Result<Table, AppError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::StoreError(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} does not exist yet, starting empty", self.path.display());
                Ok(Table::default())
            }
            Err(e) => Err(AppError::StoreError(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, table: &Table) -> Result<(), AppError> {
        let body = serde_json::to_vec_pretty(table)?;
        let tmp = self.temp_path();
        let io_err = |e: std::io::Error| AppError::StoreError(format!("{}: {}", tmp.display(), e));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Table {
        Table {
            header: vec!["Número".to_string(), "Productos".to_string()],
            rows: vec![
                vec!["1001-2024".to_string(), "(1) Sillas".to_string()],
                vec!["1002-2024".to_string()],
            ],
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        let table = store.load().await.unwrap();
        assert!(table.header.is_empty());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/tenders.json"));

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), sample());
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("tenders.json"));
        store.save(&sample()).await.unwrap();

        let smaller = Table {
            header: sample().header,
            rows: vec![vec!["1003-2024".to_string(), "(2) Mesas".to_string()]],
        };
        store.save(&smaller).await.unwrap();
        assert_eq!(store.load().await.unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_store_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tenders.json");
        std::fs::write(&path, "not json").unwrap();

        let result = JsonFileStore::new(&path).load().await;
        assert!(matches!(result, Err(AppError::StoreError(_))));
    }

    #[test]
    fn test_label_and_temp_path() {
        let store = JsonFileStore::new("/tmp/data/tenders.json");
        assert_eq!(store.label(), "file /tmp/data/tenders.json");
        assert_eq!(store.temp_path(), PathBuf::from("/tmp/data/tenders.json.tmp"));
    }
}
