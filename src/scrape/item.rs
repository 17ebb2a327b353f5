//! Tracked items and the groups that share an export destination.

use super::client::PageFetch;
use super::selector::PriceSelector;
use super::tweak::SpecialTweak;
use crate::error::FetchError;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Description of a price to track. Building one performs no I/O; call
/// [`resolve`](ItemSpec::resolve) to obtain the price.
#[derive(Debug, Clone)]
pub struct ItemSpec {
    name: String,
    url: String,
    selector: Arc<PriceSelector>,
    tweak: Option<Arc<SpecialTweak>>,
    fetch_delay: Duration,
    hardcoded_price: Option<f64>,
}

impl ItemSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, selector: Arc<PriceSelector>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            selector,
            tweak: None,
            fetch_delay: Duration::ZERO,
            hardcoded_price: None,
        }
    }

    /// Sends the tweak's cookies and headers with the request.
    pub fn with_tweak(mut self, tweak: Arc<SpecialTweak>) -> Self {
        self.tweak = Some(tweak);
        self
    }

    /// Waits this long before the first request.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Uses a fixed price and never fetches the page.
    pub fn with_price(mut self, price: f64) -> Self {
        self.hardcoded_price = Some(price);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolves the price: the hardcoded one if set, otherwise fetched and
    /// extracted with retries. Exhausted retries give an absent price.
    pub async fn resolve(self, fetcher: &dyn PageFetch, policy: &RetryPolicy) -> Item {
        if let Some(price) = self.hardcoded_price {
            info!("Hardcoded '{}' priced at {}", self.name, price);
            return Item { name: self.name, url: self.url, price: Some(price) };
        }

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        let operation = format!("Fetching price for '{}'", self.name);
        let url = self.url.as_str();
        let tweak = self.tweak.as_deref();
        let selector = self.selector.as_ref();

        let result = policy
            .run_if(
                &operation,
                move || async move {
                    let html = fetcher.fetch(url, tweak).await?;
                    selector.scrape_html(&html).map_err(FetchError::from)
                },
                FetchError::is_retryable,
            )
            .await;

        let price = match result {
            Ok(price) => {
                info!("Fetched '{}' priced at {}", self.name, price);
                Some(price)
            }
            Err(e) => {
                error!("Unable to get price for '{}' from {}: {}", self.name, self.url, e);
                None
            }
        };

        Item { name: self.name, url: self.url, price }
    }
}

/// An item with its resolved price.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    name: String,
    url: String,
    price: Option<f64>,
}

impl Item {
    /// Builds an already-priced item.
    pub fn new(name: impl Into<String>, url: impl Into<String>, price: Option<f64>) -> Self {
        Self { name: name.into(), url: url.into(), price }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `None` when every fetch attempt failed.
    pub fn price(&self) -> Option<f64> {
        self.price
    }
}

/// Items waiting to be resolved, grouped by destination.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    name: String,
    items: Vec<ItemSpec>,
}

impl GroupSpec {
    pub fn new(name: impl Into<String>, items: Vec<ItemSpec>) -> Self {
        Self { name: name.into(), items }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[ItemSpec] {
        &self.items
    }

    /// Resolves every item in order, one at a time.
    pub async fn resolve(self, fetcher: &dyn PageFetch, policy: &RetryPolicy) -> ItemGroup {
        let mut items = Vec::with_capacity(self.items.len());
        for spec in self.items {
            items.push(spec.resolve(fetcher, policy).await);
        }
        ItemGroup { name: self.name, items }
    }
}

/// Priced items exported together to one table or worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemGroup {
    name: String,
    items: Vec<Item>,
}

impl ItemGroup {
    pub fn new(name: impl Into<String>, items: Vec<Item>) -> Self {
        Self { name: name.into(), items }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items in display order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(Item::name)
    }

    /// Price of the item called `name`, if present and resolved.
    pub fn price_of(&self, name: &str) -> Option<f64> {
        self.items.iter().find(|i| i.name == name).and_then(Item::price)
    }
}
