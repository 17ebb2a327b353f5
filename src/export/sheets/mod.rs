//! Remote spreadsheet exporter: one worksheet per group in a Google Sheet.
//!
//! Row 1 of every worksheet holds the item names, column A the run
//! timestamps. Each run writes one row below the last used one and formats
//! it as date and currency cells.

mod google;
pub mod store;

pub use self::google::{GoogleSheetsClient, ServiceAccountKey};
pub use self::store::{
    CellRange, CellValue, Dimension, NumberFormat, SheetStore, SpreadsheetInfo, WorksheetInfo,
};

use self::store::{a1, trim_trailing_blanks};
use super::{Exporter, DATE_HEADER};
use crate::error::{ConfigError, ExportError};
use crate::retry::RetryPolicy;
use crate::scrape::ItemGroup;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Grid size of a newly created worksheet.
pub const NEW_SHEET_ROWS: usize = 10000;
pub const NEW_SHEET_COLS: usize = 50;

const ROW_HEADROOM: usize = 100;
const ROW_GROWTH: usize = 10000;
const COL_HEADROOM: usize = 20;
const COL_GROWTH: usize = 50;

/// Appends one row per group to a spreadsheet identified by id.
pub struct GoogleSheetExporter {
    key_file: PathBuf,
    spreadsheet_id: String,
    timestamp: String,
    policy: RetryPolicy,
}

impl GoogleSheetExporter {
    /// Fails if the service account key file does not exist.
    pub fn new(
        key_file: PathBuf,
        spreadsheet_id: String,
        timestamp: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if !key_file.is_file() {
            return Err(ConfigError::MissingKeyFile(key_file));
        }

        Ok(Self {
            key_file,
            spreadsheet_id,
            timestamp: timestamp.into(),
            policy: RetryPolicy::exponential(5, Duration::from_secs(1)),
        })
    }

    /// Overrides the retry policy applied to every remote call.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Exports every group through `store`. Only a failure to load the
    /// spreadsheet itself is returned; group failures are logged.
    pub async fn export_to(
        &self,
        store: &dyn SheetStore,
        groups: &[ItemGroup],
    ) -> Result<(), ExportError> {
        let operation = format!("Loading spreadsheet {}", self.spreadsheet_id);
        let spreadsheet = self.policy.run(&operation, move || store.spreadsheet()).await?;
        info!("Start inserting data into Google Sheet: {}", spreadsheet.title);

        let mut worksheets: HashMap<String, WorksheetInfo> =
            spreadsheet.worksheets.into_iter().map(|w| (w.title.clone(), w)).collect();

        for group in groups {
            match self.export_group(store, &mut worksheets, group).await {
                Ok(()) => info!(
                    "Finished exporting data to worksheet: {} in Google Sheet: {}",
                    group.name(),
                    spreadsheet.title
                ),
                Err(e) => error!(
                    "Unable to export group '{}' to Google Sheet {}. Error: {}",
                    group.name(),
                    self.spreadsheet_id,
                    e
                ),
            }
        }

        info!("Finished exporting data to Google Sheet: {}", spreadsheet.title);
        Ok(())
    }

    async fn export_group(
        &self,
        store: &dyn SheetStore,
        worksheets: &mut HashMap<String, WorksheetInfo>,
        group: &ItemGroup,
    ) -> Result<(), ExportError> {
        let title = group.name();
        let mut sheet = match worksheets.get(title) {
            Some(sheet) => sheet.clone(),
            None => {
                let operation = format!("Creating worksheet '{}'", title);
                let sheet = self
                    .policy
                    .run(&operation, move || {
                        store.add_worksheet(title, NEW_SHEET_ROWS, NEW_SHEET_COLS)
                    })
                    .await?;
                info!("Created new worksheet with title: {}", title);
                sheet
            }
        };

        let target = &sheet;
        let operation = format!("Reading header of worksheet '{}'", title);
        let header =
            trim_trailing_blanks(self.policy.run(&operation, move || store.row_values(target, 1)).await?);

        let (start_col, labels) = plan_labels(&header, group);
        let width = start_col - 1 + labels.len();
        self.ensure_capacity(store, &mut sheet, Dimension::Columns, width).await;

        if !labels.is_empty() {
            let target = &sheet;
            let cells: Vec<CellValue> = labels.iter().map(CellValue::text).collect();
            let cells = cells.as_slice();
            let operation = format!("Writing labels to worksheet '{}'", title);
            self.policy
                .run(&operation, move || store.write_row(target, 1, start_col, cells))
                .await?;
            info!(
                "Created new labels: {:?} at cell: {} in worksheet: {}",
                labels,
                a1(1, start_col),
                title
            );
        }

        let columns = column_index(&header, &labels);

        let target = &sheet;
        let operation = format!("Reading timestamps of worksheet '{}'", title);
        let used_rows =
            trim_trailing_blanks(self.policy.run(&operation, move || store.col_values(target, 1)).await?)
                .len();
        self.ensure_capacity(store, &mut sheet, Dimension::Rows, used_rows).await;

        let row_number = used_rows + 1;
        let row = build_row(&self.timestamp, group, &columns, width);

        let target = &sheet;
        let cells = row.as_slice();
        let operation = format!("Writing row {} of worksheet '{}'", row_number, title);
        self.policy.run(&operation, move || store.write_row(target, row_number, 1, cells)).await?;
        info!(
            "Inserted new data row: {:?} at cell: {} in worksheet: {}",
            row,
            a1(row_number, 1),
            title
        );

        let date_cell = CellRange::cell(row_number, 1);
        let operation = format!("Formatting {} of worksheet '{}'", date_cell.to_a1(), title);
        self.policy
            .run(&operation, move || store.format_range(target, date_cell, NumberFormat::DateTime))
            .await?;

        if width >= 2 {
            let prices = CellRange::row_span(row_number, 2, width);
            let operation = format!("Formatting {} of worksheet '{}'", prices.to_a1(), title);
            self.policy
                .run(&operation, move || store.format_range(target, prices, NumberFormat::Currency))
                .await?;
        }

        worksheets.insert(title.to_string(), sheet);
        Ok(())
    }

    /// Grows the worksheet when `used` comes within the headroom of its
    /// capacity, by at least enough to restore the headroom. Failures are
    /// logged and the export carries on.
    async fn ensure_capacity(
        &self,
        store: &dyn SheetStore,
        sheet: &mut WorksheetInfo,
        dimension: Dimension,
        used: usize,
    ) {
        let (capacity, headroom, growth, label) = match dimension {
            Dimension::Rows => (sheet.row_count, ROW_HEADROOM, ROW_GROWTH, "rows"),
            Dimension::Columns => (sheet.col_count, COL_HEADROOM, COL_GROWTH, "columns"),
        };
        if used + headroom < capacity {
            return;
        }
        let growth = growth.max(used + headroom + 1 - capacity);

        let operation = format!("Adding {} {} to worksheet '{}'", growth, label, sheet.title);
        let target = &*sheet;
        let grown =
            self.policy.run(&operation, move || store.append_dimension(target, dimension, growth)).await;

        match grown {
            Ok(()) => {
                match dimension {
                    Dimension::Rows => sheet.row_count += growth,
                    Dimension::Columns => sheet.col_count += growth,
                }
                info!("Added {} {} to worksheet: {}", growth, label, sheet.title);
            }
            Err(e) => warn!("Unable to grow worksheet '{}': {}", sheet.title, e),
        }
    }
}

#[async_trait]
impl Exporter for GoogleSheetExporter {
    fn describe(&self) -> String {
        format!("Google Sheet exporter writing to spreadsheet: {}", self.spreadsheet_id)
    }

    async fn export(&self, groups: &[ItemGroup]) -> anyhow::Result<()> {
        let client = GoogleSheetsClient::connect(&self.key_file, &self.spreadsheet_id)
            .await
            .with_context(|| {
                format!("Failed to connect to Google Sheet {}", self.spreadsheet_id)
            })?;

        self.export_to(&client, groups)
            .await
            .with_context(|| format!("Failed to export to Google Sheet {}", self.spreadsheet_id))
    }
}

/// Item names missing from `header`, in group order, and the 1-based column
/// where they start. An empty header gets the date label first.
fn plan_labels(header: &[String], group: &ItemGroup) -> (usize, Vec<String>) {
    let mut labels = Vec::new();
    if header.is_empty() {
        labels.push(DATE_HEADER.to_string());
    }

    for name in group.item_names() {
        if !header.iter().skip(1).any(|h| h == name) {
            labels.push(name.to_string());
        }
    }

    (header.len() + 1, labels)
}

/// Item name to 1-based column, for the header after `labels` were appended.
fn column_index(header: &[String], labels: &[String]) -> HashMap<String, usize> {
    let mut columns = HashMap::new();
    for (i, name) in header.iter().chain(labels).enumerate().skip(1) {
        if !name.is_empty() {
            columns.entry(name.clone()).or_insert(i + 1);
        }
    }
    columns
}

/// One row `width` cells wide: the timestamp then each price at its column.
fn build_row(
    timestamp: &str,
    group: &ItemGroup,
    columns: &HashMap<String, usize>,
    width: usize,
) -> Vec<CellValue> {
    let mut row = vec![CellValue::Blank; width.max(1)];
    row[0] = CellValue::text(timestamp);
    for item in group.items() {
        if let Some(&col) = columns.get(item.name()) {
            if col <= row.len() {
                row[col - 1] = CellValue::price(item.price());
            }
        }
    }
    row
}
