//! Configuration loaded from a TOML file: selectors, tweaks, item groups, exporters.

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::scrape::{GroupSpec, ItemSpec, PriceSelector, SpecialTweak};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Complete price checker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP settings for page fetches
    #[serde(default)]
    pub fetch: FetchSettings,

    /// Named price selectors referenced by items
    #[serde(default)]
    pub price_selectors: Vec<SelectorConfig>,

    /// Named cookie/header bundles referenced by items
    #[serde(default)]
    pub special_tweaks: Vec<TweakConfig>,

    /// Groups of items, one export table per group
    #[serde(default)]
    pub item_groups: Vec<GroupConfig>,

    /// Where the prices go
    #[serde(default)]
    pub data_exporters: Vec<ExporterConfig>,
}

/// HTTP settings shared by all page fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per item before giving up
    #[serde(default = "default_attempts")]
    pub attempts: usize,

    /// Pause between attempts in seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_attempts() -> usize {
    5
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            attempts: default_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            proxy: None,
        }
    }
}

impl FetchSettings {
    /// Retry policy for fetching one item's price.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.attempts, Duration::from_secs(self.retry_delay_secs))
    }
}

/// A named price selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub selector_name: String,
    #[serde(default)]
    pub full_price_selector: Option<String>,
    #[serde(default)]
    pub decimal_integer_selector: Option<String>,
    #[serde(default)]
    pub decimal_fraction_selector: Option<String>,
    /// Prices use `,` as decimal point and `.` for grouping
    #[serde(default)]
    pub is_euro: bool,
}

impl SelectorConfig {
    pub fn build(&self) -> Result<PriceSelector, ConfigError> {
        let (decimal_point, grouping_char) = if self.is_euro { (',', '.') } else { ('.', ',') };
        PriceSelector::new(
            &self.selector_name,
            self.full_price_selector.as_deref(),
            self.decimal_integer_selector.as_deref(),
            self.decimal_fraction_selector.as_deref(),
            decimal_point,
            grouping_char,
        )
    }
}

/// A named bundle of cookies and headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweakConfig {
    pub tweak_name: String,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// A group of items exported to the same table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub group_name: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

/// One tracked item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    pub name: String,
    pub url: String,
    pub price_selector: String,
    #[serde(default)]
    pub special_tweak: Option<String>,
    /// Seconds to wait before fetching
    #[serde(default)]
    pub get_price_delay: Option<f64>,
    /// Fixed price; the page is never fetched
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub disabled: bool,
}

/// Export destination, selected by the `type` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExporterConfig {
    /// One CSV file per group inside `directory`
    Csv { directory: PathBuf },

    /// One worksheet per group inside a Google spreadsheet
    GoogleSheet { google_service_account_key_file: PathBuf, spreadsheet_id: String },
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Builds every price selector, keyed by name.
    pub fn selectors(&self) -> Result<HashMap<String, Arc<PriceSelector>>, ConfigError> {
        let mut selectors = HashMap::new();
        for cfg in &self.price_selectors {
            let selector = Arc::new(cfg.build()?);
            if selectors.insert(cfg.selector_name.clone(), selector).is_some() {
                return Err(ConfigError::DuplicateName {
                    kind: "price selector",
                    name: cfg.selector_name.clone(),
                });
            }
        }
        Ok(selectors)
    }

    /// Builds every special tweak, keyed by name.
    pub fn tweaks(&self) -> Result<HashMap<String, Arc<SpecialTweak>>, ConfigError> {
        let mut tweaks = HashMap::new();
        for cfg in &self.special_tweaks {
            let tweak = SpecialTweak::new(cfg.cookies.clone(), cfg.headers.clone());
            if tweaks.insert(cfg.tweak_name.clone(), Arc::new(tweak)).is_some() {
                return Err(ConfigError::DuplicateName {
                    kind: "special tweak",
                    name: cfg.tweak_name.clone(),
                });
            }
        }
        Ok(tweaks)
    }

    /// Builds the enabled groups with their enabled items, resolving selector
    /// and tweak references. Performs no network I/O.
    pub fn group_specs(&self) -> Result<Vec<GroupSpec>, ConfigError> {
        let selectors = self.selectors()?;
        let tweaks = self.tweaks()?;

        let mut groups = Vec::new();
        for group in &self.item_groups {
            if group.disabled {
                warn!("Skip item group: {}", group.group_name);
                continue;
            }

            let mut seen = HashSet::new();
            let mut items = Vec::new();
            for item in &group.items {
                if item.disabled {
                    warn!("Skip item: {} in item group: {}", item.name, group.group_name);
                    continue;
                }
                if !seen.insert(item.name.as_str()) {
                    return Err(ConfigError::DuplicateItem {
                        group: group.group_name.clone(),
                        item: item.name.clone(),
                    });
                }
                items.push(item.build(&selectors, &tweaks)?);
            }

            groups.push(GroupSpec::new(group.group_name.clone(), items));
        }

        Ok(groups)
    }
}

impl ItemConfig {
    fn build(
        &self,
        selectors: &HashMap<String, Arc<PriceSelector>>,
        tweaks: &HashMap<String, Arc<SpecialTweak>>,
    ) -> Result<ItemSpec, ConfigError> {
        let selector =
            selectors.get(&self.price_selector).ok_or_else(|| ConfigError::UnknownSelector {
                item: self.name.clone(),
                selector: self.price_selector.clone(),
            })?;

        let mut spec = ItemSpec::new(self.name.clone(), self.url.clone(), selector.clone());

        if let Some(tweak_name) = &self.special_tweak {
            let tweak = tweaks.get(tweak_name).ok_or_else(|| ConfigError::UnknownTweak {
                item: self.name.clone(),
                tweak: tweak_name.clone(),
            })?;
            spec = spec.with_tweak(tweak.clone());
        }

        if let Some(seconds) = self.get_price_delay {
            let delay = Duration::try_from_secs_f64(seconds)
                .map_err(|_| ConfigError::InvalidDelay { item: self.name.clone(), value: seconds })?;
            spec = spec.with_fetch_delay(delay);
        }

        if let Some(price) = self.price {
            spec = spec.with_price(price);
        }

        Ok(spec)
    }
}
