use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "licita")]
#[command(
    author,
    version,
    about = "Keeps a spreadsheet of open Mercado Publico tenders up to date"
)]
#[command(after_help = "Examples:
  licita sync
  licita sync --days 5 --dry-run
  licita fetch 1509-5-L124
  licita --file tenders.json prune
  licita export --format csv > tenders.csv")]
pub struct Config {
    /// Mercado Publico API ticket
    #[arg(long, env = "TICKET_API", hide_env_values = true)]
    pub ticket: Option<String>,

    /// Google spreadsheet id holding the dataset
    #[arg(long, env = "SHEET_ID")]
    pub sheet_id: Option<String>,

    /// OAuth access token for the Sheets API
    #[arg(long, env = "SHEETS_ACCESS_TOKEN", hide_env_values = true)]
    pub sheets_token: Option<String>,

    /// Use a local JSON table file instead of the spreadsheet
    #[arg(long, env = "LICITA_DATASET_FILE", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Custom path to the config.toml file
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Repair incomplete rows, discover new tenders, drop expired ones
    #[command(after_help = "Examples:
  licita sync                  # Default window from config (3 days)
  licita sync --days 7         # Scan a wider window
  licita sync --dry-run        # Run every phase, write nothing")]
    Sync {
        /// Number of listing days to scan, today included
        #[arg(short, long, value_name = "N")]
        days: Option<u32>,
        /// Do not write the result back
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch one tender by its external code and print it as JSON
    #[command(after_help = "Example: licita fetch 1509-5-L124")]
    Fetch {
        /// Tender external code
        id: String,
    },
    /// Drop expired tenders without calling the registry
    Prune {
        /// Report what would be removed, write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Show dataset statistics
    Stats,
    /// Export the dataset to stdout
    #[command(after_help = "Examples:
  licita export --format jsonl > tenders.jsonl
  licita export --format csv > tenders.csv")]
    Export {
        /// Output format for exported data
        #[arg(short, long, default_value = "jsonl")]
        format: ExportFormat,
    },
}

/// Supported export formats
#[derive(Debug, Clone, ValueEnum)]
pub enum ExportFormat {
    /// JSON Lines format (one JSON object per line)
    Jsonl,
    /// Standard JSON array format
    Json,
    /// CSV format (comma-separated values)
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Config::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_with_flags() {
        let config =
            Config::try_parse_from(["licita", "--file", "t.json", "sync", "--days", "5", "--dry-run"])
                .unwrap();
        assert_eq!(config.file, Some(PathBuf::from("t.json")));
        match config.command {
            Command::Sync { days, dry_run } => {
                assert_eq!(days, Some(5));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_export_format() {
        let config = Config::try_parse_from(["licita", "export", "--format", "csv"]).unwrap();
        assert!(matches!(
            config.command,
            Command::Export {
                format: ExportFormat::Csv
            }
        ));
    }

    #[test]
    fn test_global_verbose_after_subcommand() {
        let config = Config::try_parse_from(["licita", "stats", "--verbose"]).unwrap();
        assert!(config.verbose);
    }
}
