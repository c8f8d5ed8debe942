use anyhow::{Context, bail};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use licita::{Command, Config, ExportFormat};
use licita_client::MercadoPublicoClient;
use licita_core::dates::registry_now;
use licita_core::{
    Column, Dataset, DatasetStore, DatasetSummary, FetchOutcome, PacingState, Settings,
    SyncOptions, SyncPipeline, SyncReport, TenderSource, load_settings,
};
use licita_store::{JsonFileStore, SheetsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::parse();

    // Logs go to stderr to keep stdout clean for exports
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if config.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    let mut settings =
        load_settings(config.config.as_deref()).context("Failed to load configuration")?;

    match &config.command {
        Command::Sync { days, dry_run } => {
            if let Some(days) = days {
                settings.sync.days_back = *days;
            }
            settings.validate().context("Invalid configuration")?;
            let source = build_client(&config, &settings)?;
            let store = build_store(&config)?;
            sync(source.as_ref(), store.as_ref(), &settings, *dry_run).await?;
        }
        Command::Fetch { id } => {
            let source = build_client(&config, &settings)?;
            fetch(source.as_ref(), &settings, id).await?;
        }
        Command::Prune { dry_run } => {
            let store = build_store(&config)?;
            prune(store.as_ref(), &settings, *dry_run).await?;
        }
        Command::Stats => {
            let store = build_store(&config)?;
            show_stats(store.as_ref(), &settings).await?;
        }
        Command::Export { format } => {
            let store = build_store(&config)?;
            export(store.as_ref(), format.clone()).await?;
        }
    }

    Ok(())
}

fn build_client(config: &Config, settings: &Settings) -> anyhow::Result<Box<dyn TenderSource>> {
    let Some(ticket) = config.ticket.as_deref().filter(|t| !t.trim().is_empty()) else {
        bail!("Missing API ticket: set TICKET_API or pass --ticket");
    };
    let client = MercadoPublicoClient::new(ticket.trim(), settings.http.clone())
        .context("Failed to build Mercado Publico client")?;
    Ok(Box::new(client))
}

/// A local file wins over the spreadsheet when both are configured.
fn build_store(config: &Config) -> anyhow::Result<Box<dyn DatasetStore>> {
    if let Some(path) = &config.file {
        return Ok(Box::new(JsonFileStore::new(path)));
    }
    let (Some(sheet_id), Some(token)) = (config.sheet_id.as_deref(), config.sheets_token.as_deref())
    else {
        bail!(
            "No dataset configured: set SHEET_ID and SHEETS_ACCESS_TOKEN, or LICITA_DATASET_FILE"
        );
    };
    let store = SheetsStore::new(sheet_id, token).context("Failed to set up Sheets store")?;
    Ok(Box::new(store))
}

async fn load_dataset(store: &dyn DatasetStore) -> anyhow::Result<Dataset> {
    let table = store
        .load()
        .await
        .with_context(|| format!("Failed to load dataset from {}", store.label()))?;
    Ok(Dataset::from_table(&table))
}

/// Run the full pipeline
async fn sync(
    source: &dyn TenderSource,
    store: &dyn DatasetStore,
    settings: &Settings,
    dry_run: bool,
) -> anyhow::Result<()> {
    info!("Starting sync against {}", store.label());

    let report = SyncPipeline::new(source, store, settings)
        .run(SyncOptions { dry_run })
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .context("Sync aborted")?;

    print_report(&report);
    Ok(())
}

/// Fetch a single tender by code
async fn fetch(source: &dyn TenderSource, settings: &Settings, id: &str) -> anyhow::Result<()> {
    let mut pacing = PacingState::new(settings.pacing.clone());
    match source.fetch_detail(id, &mut pacing).await {
        FetchOutcome::Found(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        FetchOutcome::Empty => bail!("No tender found for {}", id.trim()),
        FetchOutcome::Failed => bail!("Could not fetch {} after retries", id.trim()),
    }
}

/// Drop expired rows only
async fn prune(store: &dyn DatasetStore, settings: &Settings, dry_run: bool) -> anyhow::Result<()> {
    // Never reached through the source.
    let source = NoSource;
    let report = SyncPipeline::new(&source, store, settings)
        .prune(SyncOptions { dry_run })
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .context("Prune aborted")?;

    print_report(&report);
    Ok(())
}

/// Show dataset statistics
async fn show_stats(store: &dyn DatasetStore, settings: &Settings) -> anyhow::Result<()> {
    let dataset = load_dataset(store).await?;
    let reference = registry_now(settings.sync.timezone);
    let stats = DatasetSummary::of(&dataset, reference);

    println!("\nDataset Statistics ({})\n", store.label());
    println!("  Rows:                  {}", stats.rows);
    println!("  Missing products:      {}", stats.incomplete);
    println!("  Already closed:        {}", stats.expired);
    println!("  Unknown closing date:  {}", stats.unknown_closing);
    println!("  Duplicate ids:         {}", stats.duplicate_ids);
    println!(
        "  As of:                 {} ({})",
        reference.format("%Y-%m-%d %H:%M"),
        settings.sync.timezone
    );
    println!();

    Ok(())
}

/// Export the dataset to various formats
async fn export(store: &dyn DatasetStore, format: ExportFormat) -> anyhow::Result<()> {
    info!("Exporting dataset...");

    let dataset = load_dataset(store).await?;

    if dataset.is_empty() {
        eprintln!("No tenders found to export.");
        return Ok(());
    }

    let output = match format {
        ExportFormat::Jsonl => export_jsonl(&dataset)?,
        ExportFormat::Json => export_json(&dataset)?,
        ExportFormat::Csv => export_csv(&dataset),
    };
    print!("{}", output);

    info!("Export complete: {} tenders", dataset.len());
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("\nSync Summary\n");
    println!("  Rows loaded:           {}", report.loaded);
    if report.repair.total() > 0 {
        println!(
            "  Repaired:              {} ({} without detail, {} failed)",
            report.repair.found, report.repair.empty, report.repair.failed
        );
    }
    if report.discovery.days_scanned > 0 {
        println!(
            "  Days scanned:          {} ({} unavailable)",
            report.discovery.days_scanned, report.discovery.days_failed
        );
        println!("  Candidates:            {}", report.discovery.candidates);
    }
    println!("  New tenders:           {}", report.new_records);
    if report.duplicates_dropped > 0 {
        println!("  Duplicates dropped:    {}", report.duplicates_dropped);
    }
    println!("  Expired removed:       {}", report.expired);
    println!("  Final rows:            {}", report.final_rows);
    if let Some(reference) = report.reference {
        println!("  Reference time:        {}", reference.format("%Y-%m-%d %H:%M"));
    }
    println!(
        "  Written:               {}",
        if report.persisted { "yes" } else { "no" }
    );
    println!();

    if report.discovery.fetches.failed + report.repair.failed > 0 {
        warn!(
            "{} detail fetches failed; they will be retried on the next run",
            report.discovery.fetches.failed + report.repair.failed
        );
    }
}

/// Source for commands that never reach the registry.
struct NoSource;

#[async_trait::async_trait]
impl TenderSource for NoSource {
    async fn fetch_detail(&self, _id: &str, _pacing: &mut PacingState) -> FetchOutcome {
        FetchOutcome::Failed
    }

    async fn list_by_date(
        &self,
        _date: chrono::NaiveDate,
    ) -> Result<Vec<licita_core::ListingSummary>, licita_core::AppError> {
        Ok(Vec::new())
    }
}

/// One JSON object per row, keyed by column header
fn export_record(row: &licita_core::Row) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = Column::ALL
        .into_iter()
        .map(|c| (c.header().to_string(), serde_json::Value::from(row.get(c))))
        .collect();
    serde_json::Value::Object(map)
}

/// Export rows in JSON Lines format (one JSON object per line)
fn export_jsonl(dataset: &Dataset) -> anyhow::Result<String> {
    let mut out = String::new();
    for row in &dataset.rows {
        out.push_str(&serde_json::to_string(&export_record(row))?);
        out.push('\n');
    }
    Ok(out)
}

/// Export rows as a JSON array
fn export_json(dataset: &Dataset) -> anyhow::Result<String> {
    let records: Vec<_> = dataset.rows.iter().map(export_record).collect();
    Ok(format!("{}\n", serde_json::to_string_pretty(&records)?))
}

/// Export rows in CSV format, columns in table order
fn export_csv(dataset: &Dataset) -> String {
    let mut out = Column::ALL
        .into_iter()
        .map(|c| escape_csv(c.header()))
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');

    for row in &dataset.rows {
        let line = Column::ALL
            .into_iter()
            .map(|c| escape_csv(row.get(c)))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Escape a string for CSV output
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use licita_core::Row;

    fn dataset() -> Dataset {
        let mut row = Row::default();
        row.set(Column::Number, "1001-2024");
        row.set(Column::Title, "Sillas, mesas y \"otros\"");
        row.set(Column::Products, "(2) Sillas || (1) Mesa");
        Dataset::new(vec![row])
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_export_csv_layout() {
        let csv = export_csv(&dataset());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Link,Número,Estado,Rubro,"));
        assert!(lines[0].ends_with(",Enlace,Prioridad"));
        assert!(lines[1].starts_with(",1001-2024,,,\"Sillas, mesas y \"\"otros\"\"\","));
    }

    #[test]
    fn test_export_jsonl_keys_by_header() {
        let out = export_jsonl(&dataset()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["Número"], "1001-2024");
        assert_eq!(value["Productos"], "(2) Sillas || (1) Mesa");
        assert_eq!(value["Prioridad"], "");
        assert_eq!(value.as_object().unwrap().len(), 16);
    }

    #[test]
    fn test_export_json_is_array() {
        let out = export_json(&dataset()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_build_store_requires_a_target() {
        let config = Config::try_parse_from(["licita", "stats"]).unwrap();
        let config = Config {
            sheet_id: None,
            file: None,
            ..config
        };
        assert!(build_store(&config).is_err());
    }
}
