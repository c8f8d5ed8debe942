//! Tender records, the fixed-schema dataset and its table form.

use serde::{Deserialize, Serialize};

/// Status text written for every tender fetched by detail.
pub const STATUS_PUBLISHED: &str = "Publicada";

/// Columns of the persisted table, in their fixed output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Link,
    Number,
    Status,
    Category,
    Title,
    Products,
    EstimatedAmount,
    Currency,
    ClosingDate,
    Buyer,
    Region,
    ContactEmail,
    Description,
    PublishedDate,
    /// Manual column, never written by the pipeline.
    Enlace,
    /// Manual column, never written by the pipeline.
    Priority,
}

impl Column {
    pub const ALL: [Column; 16] = [
        Column::Link,
        Column::Number,
        Column::Status,
        Column::Category,
        Column::Title,
        Column::Products,
        Column::EstimatedAmount,
        Column::Currency,
        Column::ClosingDate,
        Column::Buyer,
        Column::Region,
        Column::ContactEmail,
        Column::Description,
        Column::PublishedDate,
        Column::Enlace,
        Column::Priority,
    ];

    /// Header text as it appears in the spreadsheet.
    pub fn header(self) -> &'static str {
        match self {
            Column::Link => "Link",
            Column::Number => "Número",
            Column::Status => "Estado",
            Column::Category => "Rubro",
            Column::Title => "Nombre de la Licitación",
            Column::Products => "Productos",
            Column::EstimatedAmount => "Monto Estimado",
            Column::Currency => "Moneda",
            Column::ClosingDate => "Fecha Cierre",
            Column::Buyer => "Comprador",
            Column::Region => "Region",
            Column::ContactEmail => "Contacto Email",
            Column::Description => "Descripcion",
            Column::PublishedDate => "Fecha Publicacion",
            Column::Enlace => "Enlace",
            Column::Priority => "Prioridad",
        }
    }

    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        Column::ALL.into_iter().find(|c| c.header() == header)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One tender as mapped from the detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub link: String,
    pub id: String,
    pub status: String,
    pub category: String,
    pub title: String,
    /// `(qty) name` entries joined by ` || `.
    pub products: String,
    pub estimated_amount: f64,
    pub currency: String,
    /// `YYYY-MM-DD HH:MM:SS` or empty.
    pub closing_date: String,
    pub buyer: String,
    pub region: String,
    pub contact_email: String,
    pub description: String,
    pub published_date: String,
}

impl Record {
    /// Every column this record carries a value for.
    pub fn cells(&self) -> [(Column, String); 14] {
        [
            (Column::Link, self.link.clone()),
            (Column::Number, self.id.clone()),
            (Column::Status, self.status.clone()),
            (Column::Category, self.category.clone()),
            (Column::Title, self.title.clone()),
            (Column::Products, self.products.clone()),
            (Column::EstimatedAmount, format_amount(self.estimated_amount)),
            (Column::Currency, self.currency.clone()),
            (Column::ClosingDate, self.closing_date.clone()),
            (Column::Buyer, self.buyer.clone()),
            (Column::Region, self.region.clone()),
            (Column::ContactEmail, self.contact_email.clone()),
            (Column::Description, self.description.clone()),
            (Column::PublishedDate, self.published_date.clone()),
        ]
    }
}

/// Integral amounts render without a fractional part.
pub fn format_amount(amount: f64) -> String {
    if amount.is_finite() && amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{}", amount as i64)
    } else {
        amount.to_string()
    }
}

/// One dataset row: a string cell per [`Column`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<String>,
}

impl Default for Row {
    fn default() -> Self {
        Self {
            cells: vec![String::new(); Column::ALL.len()],
        }
    }
}

impl Row {
    pub fn get(&self, column: Column) -> &str {
        &self.cells[column.index()]
    }

    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        self.cells[column.index()] = value.into();
    }

    /// Trimmed identifier, the dataset key.
    pub fn id(&self) -> &str {
        self.get(Column::Number).trim()
    }

    /// Rows without a product summary are candidates for repair.
    pub fn is_incomplete(&self) -> bool {
        self.get(Column::Products).trim().is_empty()
    }

    /// Overwrites every column the record carries; manual columns stay.
    pub fn apply(&mut self, record: &Record) {
        for (column, value) in record.cells() {
            self.set(column, value);
        }
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

impl From<&Record> for Row {
    fn from(record: &Record) -> Self {
        let mut row = Row::default();
        row.apply(record);
        row
    }
}

/// Raw table as exchanged with a store: a header row plus data rows.
///
/// Rows may be ragged; cells past the end of a row read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Ordered, fixed-schema collection of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Schema normalization on load.
    ///
    /// Columns are matched by header text; columns the schema does not know
    /// are dropped and missing ones materialize as empty strings. Fully blank
    /// rows are skipped.
    pub fn from_table(table: &Table) -> Self {
        let mapping: Vec<Option<Column>> =
            table.header.iter().map(|h| Column::from_header(h)).collect();

        let rows = table
            .rows
            .iter()
            .map(|cells| {
                let mut row = Row::default();
                for (value, column) in cells.iter().zip(&mapping) {
                    if let Some(column) = column {
                        row.set(*column, value.clone());
                    }
                }
                row
            })
            .filter(|row| !row.is_blank())
            .collect();

        Self { rows }
    }

    /// Schema normalization before persistence: every column, fixed order.
    pub fn to_table(&self) -> Table {
        Table {
            header: Column::ALL.iter().map(|c| c.header().to_string()).collect(),
            rows: self.rows.iter().map(|row| row.cells.clone()).collect(),
        }
    }

    /// Identifiers currently in the dataset.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(Row::id)
    }
}

/// Result of one detail fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(Record),
    /// The API answered but has no detail for the identifier.
    Empty,
    /// Retries exhausted.
    Failed,
}

/// Summary entry from the listing-by-date endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListingSummary {
    pub codigo_externo: String,
    pub codigo_estado: i64,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn record(id: &str) -> Record {
        Record {
            link: format!("http://example.test/{}", id),
            id: id.to_string(),
            status: STATUS_PUBLISHED.to_string(),
            category: "General".to_string(),
            title: format!("Tender {}", id),
            products: "(1) Item".to_string(),
            estimated_amount: 1000.0,
            currency: "CLP".to_string(),
            closing_date: "2030-01-01 12:00:00".to_string(),
            buyer: "Municipalidad".to_string(),
            region: "Region Metropolitana".to_string(),
            contact_email: "compras@example.test".to_string(),
            description: "Sin descripción".to_string(),
            published_date: "2024-01-01 09:00:00".to_string(),
        }
    }

    pub fn row(id: &str, products: &str, closing: &str) -> Row {
        let mut row = Row::default();
        row.set(Column::Number, id);
        row.set(Column::Products, products);
        row.set(Column::ClosingDate, closing);
        row
    }
}
