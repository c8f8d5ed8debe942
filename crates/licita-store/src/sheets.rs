//! Google Sheets store over the Sheets v4 `values` API.
//!
//! The dataset lives in the first worksheet of the spreadsheet. Loading reads
//! unformatted values with dates as serial numbers; serials in the date
//! columns are turned back into `YYYY-MM-DD HH:MM:SS` text. Saving writes the
//! new table over the top-left corner with `valueInputOption=RAW` and only then
//! clears whatever the previous table left below or to the right of it, so a
//! failed write never leaves the sheet empty.

use async_trait::async_trait;
use licita_core::dates::{format_canonical, from_sheet_serial};
use licita_core::error::AppError;
use licita_core::models::{format_amount, Column, Table};
use licita_core::traits::DatasetStore;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Columns whose cells Sheets may hold as date serials.
const DATE_COLUMNS: [Column; 2] = [Column::ClosingDate, Column::PublishedDate];

#[derive(Deserialize, Debug)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize, Debug)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

/// Size of a worksheet, or of a block of values, in cells.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
}

impl GridProperties {
    fn of(values: &[Vec<Value>]) -> Self {
        let column_count = values.iter().map(Vec::len).max().unwrap_or(0);
        let row_count = if column_count == 0 { 0 } else { values.len() };
        Self {
            row_count,
            column_count,
        }
    }
}

/// Body of `values.get` and `values.update`.
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    major_dimension: Option<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Spreadsheet-backed [`DatasetStore`].
///
/// Authenticates with a ready OAuth access token (scope
/// `https://www.googleapis.com/auth/spreadsheets`). Minting that token from a
/// service account is left to the environment running the sync.
///
/// # Examples
///
/// ```no_run
/// use licita_store::SheetsStore;
/// use licita_core::DatasetStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SheetsStore::new("1AbCdEf", "ya29.token")?;
/// let table = store.load().await?;
/// println!("{} rows", table.rows.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SheetsStore {
    client: Client,
    base_url: Url,
    spreadsheet_id: String,
    token: String,
}

impl SheetsStore {
    pub fn new(spreadsheet_id: &str, token: &str) -> Result<Self, AppError> {
        Self::with_base_url(SHEETS_API, spreadsheet_id, token)
    }

    /// Targets an alternative API root, e.g. a local emulator.
    pub fn with_base_url(base: &str, spreadsheet_id: &str, token: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(base).map_err(|_| AppError::InvalidUrl(base.to_string()))?;
        if spreadsheet_id.trim().is_empty() {
            return Err(AppError::ConfigError("spreadsheet id is empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(concat!("licita/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.trim().to_string(),
            token: token.to_string(),
        })
    }

    /// `<base>/<id><suffix>/<segments...>`
    fn url(&self, suffix: &str, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| AppError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty()
                .push(&format!("{}{}", self.spreadsheet_id, suffix));
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, AppError> {
        let resp = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AppError::StoreError(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::StoreError(format!(
                "HTTP {} from Sheets API: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(resp)
    }

    async fn first_sheet(&self) -> Result<SheetProperties, AppError> {
        let mut url = self.url("", &[])?;
        url.query_pairs_mut().append_pair(
            "fields",
            "sheets.properties(sheetId,title,gridProperties(rowCount,columnCount))",
        );
        let meta: SpreadsheetMeta = self
            .send(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| AppError::StoreError(e.to_string()))?;

        meta.sheets
            .into_iter()
            .next()
            .map(|s| s.properties)
            .ok_or_else(|| AppError::StoreError("spreadsheet has no worksheets".to_string()))
    }
}

#[async_trait]
impl DatasetStore for SheetsStore {
    fn label(&self) -> String {
        format!("sheet {}", self.spreadsheet_id)
    }

    async fn load(&self) -> Result<Table, AppError> {
        let sheet = self.first_sheet().await?;
        let range = quote_title(&sheet.title);
        let mut url = self.url("", &["values", &range])?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
            .append_pair("dateTimeRenderOption", "SERIAL_NUMBER")
            .append_pair("majorDimension", "ROWS");

        let body: ValueRange = self
            .send(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| AppError::StoreError(e.to_string()))?;

        let table = table_from_values(body.values);
        debug!("Read {} rows from {}", table.rows.len(), range);
        Ok(table)
    }

    async fn save(&self, table: &Table) -> Result<(), AppError> {
        let sheet = self.first_sheet().await?;
        let values = values_from_table(table);
        let extent = GridProperties::of(&values);

        let grow = growth_requests(sheet.sheet_id, sheet.grid_properties, extent);
        if !grow.is_empty() {
            let url = self.url(":batchUpdate", &[])?;
            self.send(self.client.post(url).json(&json!({ "requests": grow })))
                .await?;
        }

        if extent.row_count > 0 {
            let range = written_range(&sheet.title, extent);
            let mut update = self.url("", &["values", &range])?;
            update
                .query_pairs_mut()
                .append_pair("valueInputOption", "RAW");
            let body = ValueRange {
                range: Some(range),
                major_dimension: Some("ROWS".to_string()),
                values,
            };
            self.send(self.client.put(update).json(&body)).await?;
        }

        let stale = stale_ranges(&sheet.title, sheet.grid_properties, extent);
        if !stale.is_empty() {
            let url = self.url("", &["values:batchClear"])?;
            self.send(self.client.post(url).json(&json!({ "ranges": stale })))
                .await?;
        }

        debug!(
            "Wrote {} rows to {}, cleared {} stale ranges",
            table.rows.len(),
            sheet.title,
            stale.len()
        );
        Ok(())
    }
}

/// Quotes a worksheet title for A1 notation.
fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// A1 column letters for a 1-based column number.
fn column_letter(mut n: usize) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

/// Block the new values occupy, anchored at A1.
fn written_range(title: &str, extent: GridProperties) -> String {
    format!(
        "{}!A1:{}{}",
        quote_title(title),
        column_letter(extent.column_count),
        extent.row_count
    )
}

/// `appendDimension` requests making the grid large enough for `extent`.
fn growth_requests(sheet_id: i64, grid: GridProperties, extent: GridProperties) -> Vec<Value> {
    let mut requests = Vec::new();
    if extent.row_count > grid.row_count {
        requests.push(json!({ "appendDimension": {
            "sheetId": sheet_id,
            "dimension": "ROWS",
            "length": extent.row_count - grid.row_count,
        }}));
    }
    if extent.column_count > grid.column_count {
        requests.push(json!({ "appendDimension": {
            "sheetId": sheet_id,
            "dimension": "COLUMNS",
            "length": extent.column_count - grid.column_count,
        }}));
    }
    requests
}

/// Cells of the existing grid outside the freshly written block.
fn stale_ranges(title: &str, grid: GridProperties, extent: GridProperties) -> Vec<String> {
    let sheet = quote_title(title);
    let mut ranges = Vec::new();
    if grid.column_count == 0 {
        return ranges;
    }
    let last_column = column_letter(grid.column_count);

    if grid.row_count > extent.row_count {
        ranges.push(format!(
            "{}!A{}:{}{}",
            sheet,
            extent.row_count + 1,
            last_column,
            grid.row_count
        ));
    }
    if extent.row_count > 0 && grid.column_count > extent.column_count {
        ranges.push(format!(
            "{}!{}1:{}{}",
            sheet,
            column_letter(extent.column_count + 1),
            last_column,
            extent.row_count
        ));
    }
    ranges
}

/// First row is the header; an empty sheet is an empty table.
fn table_from_values(values: Vec<Vec<Value>>) -> Table {
    let mut rows = values.into_iter();
    let header: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(cell_text).collect())
        .unwrap_or_default();

    let date_columns: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| Column::from_header(h).is_some_and(|c| DATE_COLUMNS.contains(&c)))
        .map(|(idx, _)| idx)
        .collect();

    let rows = rows
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(idx, cell)| match cell {
                    Value::Number(n) if date_columns.contains(&idx) => n
                        .as_f64()
                        .and_then(from_sheet_serial)
                        .map(format_canonical)
                        .unwrap_or_else(|| cell_text(cell)),
                    _ => cell_text(cell),
                })
                .collect()
        })
        .collect();

    Table { header, rows }
}

fn values_from_table(table: &Table) -> Vec<Vec<Value>> {
    let amount_idx = table
        .header
        .iter()
        .position(|h| h == Column::EstimatedAmount.header());

    let header: Vec<Value> = table.header.iter().cloned().map(Value::String).collect();
    let rows = table.rows.iter().map(|row| -> Vec<Value> {
        row.iter()
            .enumerate()
            .map(|(idx, cell)| {
                if Some(idx) == amount_idx {
                    if let Some(n) = cell
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                    {
                        return Value::Number(n);
                    }
                }
                Value::String(cell.clone())
            })
            .collect()
    });
    std::iter::once(header).chain(rows).collect()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_amount).unwrap_or_else(|| n.to_string()),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
