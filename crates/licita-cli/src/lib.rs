//! Licita CLI - Command-line interface tying the Licita crates together.

pub mod config;

pub use config::{Command, Config, ExportFormat};
