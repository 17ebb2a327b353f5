//! Remote spreadsheet primitives used by the sheet exporter.

use crate::error::ExportError;
use async_trait::async_trait;

/// Metadata of a spreadsheet and its worksheets.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub worksheets: Vec<WorksheetInfo>,
}

/// A worksheet and its allocated grid size.
#[derive(Debug, Clone, PartialEq)]
pub struct WorksheetInfo {
    pub id: i64,
    pub title: String,
    pub row_count: usize,
    pub col_count: usize,
}

/// Value written to a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Blank,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Number cell for a resolved price, blank otherwise.
    pub fn price(price: Option<f64>) -> Self {
        price.map(CellValue::Number).unwrap_or(CellValue::Blank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Rows,
    Columns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    DateTime,
    Currency,
}

/// Inclusive cell range with 1-based rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl CellRange {
    pub fn cell(row: usize, col: usize) -> Self {
        Self { start_row: row, start_col: col, end_row: row, end_col: col }
    }

    /// Cells `start_col..=end_col` of one row.
    pub fn row_span(row: usize, start_col: usize, end_col: usize) -> Self {
        Self { start_row: row, start_col, end_row: row, end_col }
    }

    /// A1 notation, e.g. `B2:D2`, or `B2` for a single cell.
    pub fn to_a1(&self) -> String {
        let start = a1(self.start_row, self.start_col);
        if self.start_row == self.end_row && self.start_col == self.end_col {
            start
        } else {
            format!("{}:{}", start, a1(self.end_row, self.end_col))
        }
    }
}

/// Column letters for a 1-based column index: 1 → `A`, 27 → `AA`.
pub fn column_letters(col: usize) -> String {
    let mut n = col;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A1 reference of a single cell.
pub fn a1(row: usize, col: usize) -> String {
    format!("{}{}", column_letters(col), row)
}

/// Drops trailing blank cells.
pub fn trim_trailing_blanks(mut values: Vec<String>) -> Vec<String> {
    while values.last().is_some_and(|v| v.trim().is_empty()) {
        values.pop();
    }
    values
}

/// The remote tabular store. Each method is one remote call, safe to repeat.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Loads spreadsheet metadata.
    async fn spreadsheet(&self) -> Result<SpreadsheetInfo, ExportError>;

    /// Creates a worksheet with the given grid size.
    async fn add_worksheet(
        &self,
        title: &str,
        rows: usize,
        cols: usize,
    ) -> Result<WorksheetInfo, ExportError>;

    /// Values of a 1-based row.
    async fn row_values(&self, sheet: &WorksheetInfo, row: usize)
        -> Result<Vec<String>, ExportError>;

    /// Values of a 1-based column.
    async fn col_values(&self, sheet: &WorksheetInfo, col: usize)
        -> Result<Vec<String>, ExportError>;

    /// Overwrites consecutive cells of `row` starting at `col`.
    async fn write_row(
        &self,
        sheet: &WorksheetInfo,
        row: usize,
        col: usize,
        values: &[CellValue],
    ) -> Result<(), ExportError>;

    /// Grows the grid by `length` rows or columns.
    async fn append_dimension(
        &self,
        sheet: &WorksheetInfo,
        dimension: Dimension,
        length: usize,
    ) -> Result<(), ExportError>;

    /// Applies a number format to every cell in `range`.
    async fn format_range(
        &self,
        sheet: &WorksheetInfo,
        range: CellRange,
        format: NumberFormat,
    ) -> Result<(), ExportError>;
}
