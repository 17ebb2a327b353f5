//! Export destinations for priced item groups.
//!
//! Every exporter appends one row per run to each group's table, adding
//! columns for item names it has not seen before. A failure in one group is
//! logged and does not stop the others.

pub mod csv;
pub mod sheets;

use crate::config::ExporterConfig;
use crate::error::ConfigError;
use crate::scrape::ItemGroup;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};

pub use self::csv::CsvExporter;
pub use self::sheets::GoogleSheetExporter;

/// Format of the run timestamp written to the first column.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Header of the timestamp column.
pub const DATE_HEADER: &str = "Date";

/// A destination that receives one snapshot row per group and run.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Human readable description of the destination.
    fn describe(&self) -> String;

    /// Exports every group. Per-group failures are logged, not returned;
    /// an error means the destination as a whole was unusable.
    async fn export(&self, groups: &[ItemGroup]) -> Result<()>;
}

/// Formats the run timestamp the way it is stored in every destination.
pub fn format_timestamp(time: &DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Builds the exporter described by `config`, stamping rows with `timestamp`.
pub fn build_exporter(
    config: &ExporterConfig,
    timestamp: &str,
) -> Result<Box<dyn Exporter>, ConfigError> {
    match config {
        ExporterConfig::Csv { directory } => {
            Ok(Box::new(CsvExporter::new(directory.clone(), timestamp)))
        }
        ExporterConfig::GoogleSheet { google_service_account_key_file, spreadsheet_id } => {
            let exporter = GoogleSheetExporter::new(
                google_service_account_key_file.clone(),
                spreadsheet_id.clone(),
                timestamp,
            )?;
            Ok(Box::new(exporter))
        }
    }
}
