//! Price extraction from HTML using CSS selectors.

use crate::error::{ConfigError, ExtractionError};
use scraper::{Html, Selector};
use tracing::trace;

/// Where a price lives in a page.
#[derive(Debug, Clone)]
enum Location {
    /// One node holds the whole price.
    Full(NamedSelector),
    /// Integer and fractional parts live in separate nodes.
    Split { integer: NamedSelector, fraction: NamedSelector },
}

/// A parsed selector together with its source text, for error messages.
#[derive(Debug, Clone)]
struct NamedSelector {
    source: String,
    selector: Selector,
}

impl NamedSelector {
    fn parse(name: &str, source: &str) -> Result<Self, ConfigError> {
        let selector = Selector::parse(source).map_err(|e| ConfigError::InvalidSelector {
            name: name.to_string(),
            reason: format!("invalid CSS selector '{}': {}", source, e),
        })?;
        Ok(Self { source: source.to_string(), selector })
    }
}

/// Rule for locating and parsing a price inside a fetched page.
#[derive(Debug, Clone)]
pub struct PriceSelector {
    location: Location,
    decimal_point: char,
    grouping_char: char,
}

impl PriceSelector {
    /// Builds a selector from either a full-price selector or an
    /// integer/fraction pair. Any other combination is rejected.
    pub fn new(
        name: &str,
        full: Option<&str>,
        integer: Option<&str>,
        fraction: Option<&str>,
        decimal_point: char,
        grouping_char: char,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSelector {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let location = match (full, integer, fraction) {
            (Some(full), None, None) => Location::Full(NamedSelector::parse(name, full)?),
            (None, Some(integer), Some(fraction)) => Location::Split {
                integer: NamedSelector::parse(name, integer)?,
                fraction: NamedSelector::parse(name, fraction)?,
            },
            (Some(_), _, _) => {
                return Err(invalid(
                    "full_price_selector cannot be combined with \
                     decimal_integer_selector or decimal_fraction_selector",
                ))
            }
            (None, _, _) => {
                return Err(invalid(
                    "either full_price_selector or both decimal_integer_selector \
                     and decimal_fraction_selector must be provided",
                ))
            }
        };

        if decimal_point == grouping_char {
            return Err(invalid("decimal point and grouping character must differ"));
        }

        Ok(Self { location, decimal_point, grouping_char })
    }

    /// Full-price selector using `.` decimals and `,` grouping.
    pub fn full(name: &str, selector: &str) -> Result<Self, ConfigError> {
        Self::new(name, Some(selector), None, None, '.', ',')
    }

    /// Integer/fraction selector pair using `.` decimals and `,` grouping.
    pub fn split(name: &str, integer: &str, fraction: &str) -> Result<Self, ConfigError> {
        Self::new(name, None, Some(integer), Some(fraction), '.', ',')
    }

    /// Switches to euro-style numbers: `,` decimals and `.` grouping.
    pub fn euro(mut self) -> Self {
        self.decimal_point = ',';
        self.grouping_char = '.';
        self
    }

    pub fn decimal_point(&self) -> char {
        self.decimal_point
    }

    pub fn grouping_char(&self) -> char {
        self.grouping_char
    }

    /// Parses `html` and extracts the price from it.
    pub fn scrape_html(&self, html: &str) -> Result<f64, ExtractionError> {
        let document = Html::parse_document(html);
        self.scrape_price(&document)
    }

    /// Extracts the price from an already parsed document.
    pub fn scrape_price(&self, document: &Html) -> Result<f64, ExtractionError> {
        match &self.location {
            Location::Full(selector) => {
                let text = self.number_text(document, selector)?;
                let normalized = text.replace(self.decimal_point, ".");
                parse_number(&normalized)
            }
            Location::Split { integer, fraction } => {
                let integer = self.number_text(document, integer)?;
                let fraction = self.number_text(document, fraction)?;
                parse_number(&format!("{}.{}", integer, fraction))
            }
        }
    }

    /// Text of the first node matching `selector`, cleaned up.
    fn number_text(
        &self,
        document: &Html,
        selector: &NamedSelector,
    ) -> Result<String, ExtractionError> {
        let element = document
            .select(&selector.selector)
            .next()
            .ok_or_else(|| ExtractionError::NoMatch(selector.source.clone()))?;

        let raw = element.text().collect::<String>();
        let cleaned = self.clean_price_text(&raw);
        trace!("'{}' matched '{}', cleaned to '{}'", selector.source, raw.trim(), cleaned);
        Ok(cleaned)
    }

    /// Keeps the text from the first digit to the last digit and drops grouping
    /// characters, e.g. `"$1,234.56 USD"` becomes `"1234.56"`.
    pub fn clean_price_text(&self, text: &str) -> String {
        let Some(start) = text.find(|c: char| c.is_ascii_digit()) else {
            return String::new();
        };
        let trimmed = text[start..].trim_end_matches(|c: char| !c.is_ascii_digit());
        trimmed.chars().filter(|&c| c != self.grouping_char).collect()
    }
}

fn parse_number(text: &str) -> Result<f64, ExtractionError> {
    text.parse::<f64>().map_err(|_| ExtractionError::Unparseable { text: text.to_string() })
}
