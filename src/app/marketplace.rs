//! Product identifier checks for the two supported marketplaces.

use std::sync::LazyLock;

use regex::Regex;

use super::trust::UrlParts;

// Priority order matters: the first pattern that matches wins.
static ASIN_PATH_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)/dp/([A-Z0-9]{10})").expect("dp pattern"),
        Regex::new(r"(?i)/gp/product/([A-Z0-9]{10})").expect("gp/product pattern"),
        Regex::new(r"(?i)/product/([A-Z0-9]{10})").expect("product pattern"),
    ]
});

static ASIN_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z0-9]{10}$").expect("asin value pattern"));

const FLIPKART_PRODUCT_PATH: &str = "/p/itm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marketplace {
    Amazon,
    Flipkart,
}

impl Marketplace {
    /// Amazon is checked first; a domain never counts as both.
    pub fn for_domain(domain: &str) -> Option<Self> {
        if domain.contains("amazon.") {
            Some(Marketplace::Amazon)
        } else if domain.contains("flipkart.") {
            Some(Marketplace::Flipkart)
        } else {
            None
        }
    }
}

/// Amazon Standard Identification Number, always uppercase.
pub fn extract_amazon_asin(url: &str) -> Option<String> {
    for pattern in ASIN_PATH_PATTERNS.iter() {
        if let Some(found) = pattern.captures(url).and_then(|caps| caps.get(1)) {
            return Some(found.as_str().to_ascii_uppercase());
        }
    }

    UrlParts::parse(url)
        .query_value("asin")
        .filter(|value| ASIN_VALUE.is_match(value))
        .map(|value| value.to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlipkartId {
    Pid(String),
    /// `/p/itm...` product handle: a product page, not a verified id.
    ProductPath,
}

pub fn extract_flipkart_id(url: &str) -> Option<FlipkartId> {
    if let Some(pid) = UrlParts::parse(url).query_value("pid") {
        return Some(FlipkartId::Pid(pid.to_string()));
    }
    url.contains(FLIPKART_PRODUCT_PATH)
        .then_some(FlipkartId::ProductPath)
}
