//! Integration tests for price extraction using fixture files.

use price_checker::error::ExtractionError;
use price_checker::PriceSelector;

const PRODUCT_FIXTURE: &str = include_str!("fixtures/product_page.html");

#[test]
fn test_full_selector_on_product_page() {
    let selector = PriceSelector::full("shop", ".buy-box .price").unwrap();
    assert_eq!(selector.scrape_html(PRODUCT_FIXTURE).unwrap(), 1049.99);
}

#[test]
fn test_split_selector_on_product_page() {
    let selector = PriceSelector::split("shop-split", ".price-whole", ".price-fraction").unwrap();
    assert_eq!(selector.scrape_html(PRODUCT_FIXTURE).unwrap(), 1049.99);
}

#[test]
fn test_euro_selectors_on_product_page() {
    let full = PriceSelector::full("eu", ".eu-price").unwrap().euro();
    assert_eq!(full.scrape_html(PRODUCT_FIXTURE).unwrap(), 1029.5);

    let split = PriceSelector::split("eu-split", ".eu-whole", ".eu-fraction").unwrap().euro();
    assert_eq!(split.scrape_html(PRODUCT_FIXTURE).unwrap(), 1029.5);
}

#[test]
fn test_first_match_wins() {
    // The recommendation card comes before the buy box
    let selector = PriceSelector::full("old", ".old-price").unwrap();
    assert_eq!(selector.scrape_html(PRODUCT_FIXTURE).unwrap(), 1199.0);
}

#[test]
fn test_extraction_failures_on_product_page() {
    let missing = PriceSelector::full("missing", ".no-such-price").unwrap();
    assert!(matches!(missing.scrape_html(PRODUCT_FIXTURE), Err(ExtractionError::NoMatch(_))));

    let no_digits = PriceSelector::full("sold-out", ".unavailable").unwrap();
    assert!(matches!(
        no_digits.scrape_html(PRODUCT_FIXTURE),
        Err(ExtractionError::Unparseable { .. })
    ));
}
