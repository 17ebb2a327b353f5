//! One price check run: resolve every group, then hand the snapshot to each exporter.

use crate::config::Config;
use crate::export::{build_exporter, format_timestamp, Exporter};
use crate::scrape::{HttpFetcher, ItemGroup, PageFetch};
use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, info, warn};

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    /// Groups that were resolved and exported
    pub groups: usize,
    /// Items across all groups
    pub items: usize,
    /// Items that ended up without a price
    pub unpriced: usize,
    /// Exporters whose export call failed as a whole
    pub failed_exporters: Vec<String>,
}

/// Executes a full fetch and export pass.
pub struct CheckCommand {
    config: Config,
}

impl CheckCommand {
    /// Creates a new check command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the pass against the live web.
    pub async fn execute(&self) -> Result<CheckReport> {
        let fetcher =
            HttpFetcher::new(&self.config.fetch).context("Failed to create HTTP client")?;
        let timestamp = format_timestamp(&Local::now());

        self.execute_with_fetcher(&fetcher, &timestamp).await
    }

    /// Runs the pass with a provided fetcher and timestamp (for testing).
    ///
    /// Configuration problems are reported before any page is fetched. Exporter
    /// failures are logged and recorded in the report, never returned.
    pub async fn execute_with_fetcher(
        &self,
        fetcher: &dyn PageFetch,
        timestamp: &str,
    ) -> Result<CheckReport> {
        let specs = self.config.group_specs().context("Invalid item configuration")?;
        let exporters = self.build_exporters(timestamp)?;

        if exporters.is_empty() {
            warn!("No data exporters configured; prices will only be logged");
        }

        let policy = self.config.fetch.retry_policy();
        let mut groups: Vec<ItemGroup> = Vec::with_capacity(specs.len());
        for spec in specs {
            info!("Checking prices for group: {} ({} items)", spec.name(), spec.items().len());
            groups.push(spec.resolve(fetcher, &policy).await);
        }

        let mut report = CheckReport {
            groups: groups.len(),
            items: groups.iter().map(|g| g.items().len()).sum(),
            unpriced: groups
                .iter()
                .flat_map(|g| g.items())
                .filter(|i| i.price().is_none())
                .count(),
            failed_exporters: Vec::new(),
        };

        for exporter in &exporters {
            info!("Exporting with {}", exporter.describe());
            if let Err(e) = exporter.export(&groups).await {
                error!("Unable to export data for exporter: {}. Error: {:#}", exporter.describe(), e);
                report.failed_exporters.push(exporter.describe());
            }
        }

        info!(
            "Price check finished: {} groups, {} items, {} without price",
            report.groups, report.items, report.unpriced
        );
        Ok(report)
    }

    fn build_exporters(&self, timestamp: &str) -> Result<Vec<Box<dyn Exporter>>> {
        self.config
            .data_exporters
            .iter()
            .map(|c| build_exporter(c, timestamp).context("Invalid data exporter configuration"))
            .collect()
    }
}
