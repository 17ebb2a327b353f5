//! CSV exporter: one file per group, rewritten atomically on every run.

use super::{Exporter, DATE_HEADER};
use crate::error::ExportError;
use crate::retry::RetryPolicy;
use crate::scrape::ItemGroup;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Writes each group to `<directory>/<group>.csv`.
pub struct CsvExporter {
    directory: PathBuf,
    timestamp: String,
    write_policy: RetryPolicy,
}

impl CsvExporter {
    pub fn new(directory: impl Into<PathBuf>, timestamp: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            timestamp: timestamp.into(),
            write_policy: RetryPolicy::fixed(5, Duration::from_secs(1)),
        }
    }

    /// Overrides the retry policy used for writing files.
    pub fn with_write_policy(mut self, policy: RetryPolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Path of the CSV file for `group`.
    pub fn table_path(&self, group: &str) -> PathBuf {
        self.directory.join(format!("{}.csv", group))
    }

    async fn export_group(&self, group: &ItemGroup) -> Result<PathBuf, ExportError> {
        let path = self.table_path(group.name());
        let temp_path = self.directory.join(format!("{}.csv.tmp", group.name()));

        let mut rows = read_rows(&path)?;
        let new_headers = append_snapshot(&mut rows, group, &self.timestamp);
        if !new_headers.is_empty() {
            info!("Added new headers: {:?}", new_headers);
        }
        if let Some(row) = rows.last() {
            info!("Added new row: {:?}", row);
        }

        let operation = format!("Writing {}", temp_path.display());
        let (temp, snapshot) = (temp_path.as_path(), rows.as_slice());
        let written = self
            .write_policy
            .run(&operation, move || async move { write_rows(temp, snapshot) })
            .await
            .and_then(|()| fs::rename(&temp_path, &path).map_err(|e| ExportError::io(&path, e)));

        if let Err(e) = written {
            // Best effort: the temp file may not exist at all
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        Ok(path)
    }
}

#[async_trait]
impl Exporter for CsvExporter {
    fn describe(&self) -> String {
        format!("CSV exporter writing to directory: {}", self.directory.display())
    }

    async fn export(&self, groups: &[ItemGroup]) -> Result<()> {
        fs::create_dir_all(&self.directory).map_err(|e| ExportError::io(&self.directory, e))?;

        for group in groups {
            match self.export_group(group).await {
                Ok(path) => info!("Finished exporting data to csv file: {}", path.display()),
                Err(e) => error!(
                    "Unable to export group '{}' to csv file: {}. Error: {}",
                    group.name(),
                    self.table_path(group.name()).display(),
                    e
                ),
            }
        }

        info!("Finished exporting data to csv files under directory: {}", self.directory.display());
        Ok(())
    }
}

/// Reads every row of `path`, header included. A missing file has no rows.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, ExportError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let csv_error = |source| ExportError::Csv { path: path.to_path_buf(), source };
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    reader
        .records()
        .map(|record| record.map(|r| r.iter().map(String::from).collect()).map_err(csv_error))
        .collect()
}

/// Appends this run's row to `rows`, extending the header with any item names
/// it lacks. Existing rows are left untouched. Returns the added header names.
pub fn append_snapshot(
    rows: &mut Vec<Vec<String>>,
    group: &ItemGroup,
    timestamp: &str,
) -> Vec<String> {
    let format_price = |price: Option<f64>| price.map(|p| p.to_string()).unwrap_or_default();

    if rows.is_empty() {
        let mut header = vec![DATE_HEADER.to_string()];
        header.extend(group.item_names().map(String::from));

        let mut row = vec![timestamp.to_string()];
        row.extend(group.items().iter().map(|i| format_price(i.price())));

        let added = header.clone();
        rows.push(header);
        rows.push(row);
        return added;
    }

    let header = &mut rows[0];
    let new_headers: Vec<String> = group
        .item_names()
        .filter(|name| !header.iter().any(|h| h == *name))
        .map(String::from)
        .collect();
    header.extend(new_headers.iter().cloned());

    let prices: HashMap<&str, Option<f64>> =
        group.items().iter().map(|i| (i.name(), i.price())).collect();

    let mut row = vec![timestamp.to_string()];
    row.extend(
        header
            .iter()
            .skip(1)
            .map(|name| format_price(prices.get(name.as_str()).copied().flatten())),
    );

    rows.push(row);
    new_headers
}

fn write_rows(path: &Path, rows: &[Vec<String>]) -> Result<(), ExportError> {
    let csv_error = |source| ExportError::Csv { path: path.to_path_buf(), source };
    let mut writer = ::csv::WriterBuilder::new()
        .flexible(true)
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(csv_error)?;

    for row in rows {
        writer.write_record(row).map_err(csv_error)?;
    }

    writer.flush().map_err(|e| ExportError::io(path, e))
}
