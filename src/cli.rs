use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::AppConfig;
use crate::pipeline::SyncOptions;

/// Pull the user registry sheet, geocode new rows and rewrite the local CSV.
#[derive(Debug, Parser)]
#[command(name = "registry-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the persisted registry and run history.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// File name of the persisted registry inside the data directory.
    #[arg(long)]
    pub file_name: Option<String>,

    /// CSV export URL of the registry spreadsheet.
    #[arg(long)]
    pub sheet_url: Option<String>,

    /// Number of geocoding lookups allowed in flight at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Validate the new registry but do not write it.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the effective configuration (without secrets) and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::from_env();
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(name) = &self.file_name {
            config.file_name = name.clone();
        }
        if let Some(url) = &self.sheet_url {
            config.sheet_url = url.clone();
        }
        match self.concurrency {
            Some(concurrency) => config.with_concurrency(concurrency),
            None => config,
        }
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            dry_run: self.dry_run,
        }
    }
}
