//! price-checker - scrapes product prices and appends them to CSV files and Google Sheets
//!
//! Pages are fetched with browser TLS fingerprint emulation, prices are pulled
//! out with CSS selectors, and every run adds one timestamped row per group.

pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod retry;
pub mod scrape;

pub use config::Config;
pub use error::{ConfigError, ExportError, ExtractionError, FetchError};
pub use export::{CsvExporter, Exporter, GoogleSheetExporter};
pub use retry::RetryPolicy;
pub use scrape::{Item, ItemGroup, PriceSelector, SpecialTweak};
