//! HTTP client for product pages using wreq for TLS fingerprint emulation.

use super::tweak::{default_headers, merge_headers, SpecialTweak};
use crate::config::FetchSettings;
use crate::error::FetchError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use wreq::header::{HeaderName, HeaderValue};
use wreq::Client;
use wreq_util::Emulation;

/// Trait for fetching product pages - enables mocking for tests.
#[async_trait]
pub trait PageFetch: Send + Sync {
    /// Fetches `url` with the tweak's cookies and headers and returns the body.
    async fn fetch(&self, url: &str, tweak: Option<&SpecialTweak>) -> Result<String, FetchError>;
}

/// Page fetcher with browser impersonation.
pub struct HttpFetcher {
    client: Client,
    default_headers: BTreeMap<String, String>,
}

impl HttpFetcher {
    /// Creates a fetcher with the given timeout and optional proxy.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.timeout_secs.min(10)));

        if let Some(proxy_url) = &settings.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            builder = builder.proxy(wreq::Proxy::all(proxy_url)?);
        }

        Ok(Self { client: builder.build()?, default_headers: default_headers() })
    }

    fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), FetchError> {
        let invalid = |reason: String| FetchError::InvalidHeader { name: name.to_string(), reason };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        Ok((header_name, header_value))
    }
}

#[async_trait]
impl PageFetch for HttpFetcher {
    async fn fetch(&self, url: &str, tweak: Option<&SpecialTweak>) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let mut request = self.client.get(url).emulation(Emulation::Chrome131);

        for (name, value) in merge_headers(&self.default_headers, tweak) {
            let (name, value) = Self::header_pair(&name, &value)?;
            request = request.header(name, value);
        }

        if let Some(cookies) = tweak.and_then(SpecialTweak::cookie_header) {
            let (name, value) = Self::header_pair("cookie", &cookies)?;
            request = request.header(name, value);
        }

        let response = request.send().await?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == 429 || status == 503 {
            warn!("Rate limited ({}) by {}. Consider a larger get_price_delay.", status, url);
        }

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}
