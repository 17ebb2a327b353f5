//! Per-site cookie and header overrides.

use std::collections::BTreeMap;

/// Desktop Chrome user agent sent with every request unless a tweak overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Headers sent with every page request. Names are lowercase.
pub fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("user-agent".to_string(), DEFAULT_USER_AGENT.to_string()),
        (
            "accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
    ])
}

/// Extra cookies and headers for sites that need special access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialTweak {
    cookies: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
}

impl SpecialTweak {
    pub fn new(
        cookies: impl IntoIterator<Item = (String, String)>,
        headers: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self { cookies: cookies.into_iter().collect(), headers: headers.into_iter().collect() }
    }

    /// Value for a `Cookie` header, or `None` when there are no cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self.cookies.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        Some(pairs.join("; "))
    }
}

/// Overlays the tweak's headers on `defaults`. Header names are matched
/// case-insensitively and the tweak wins on conflicts.
pub fn merge_headers(
    defaults: &BTreeMap<String, String>,
    tweak: Option<&SpecialTweak>,
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> =
        defaults.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.clone())).collect();

    if let Some(tweak) = tweak {
        for (name, value) in &tweak.headers {
            merged.insert(name.to_ascii_lowercase(), value.clone());
        }
    }

    merged
}
