//! HTML parser for review pages
//!
//! This module handles parsing review page HTML to extract:
//! - The declared total number of reviews (e.g. "1,234 reviews")
//! - The text of every review rendered on the page

use crate::config::SourceConfig;
use crate::{ConfigError, ConfigResult};
use scraper::{Html, Selector};

/// Extracts review data from a page using the configured selectors
#[derive(Debug, Clone)]
pub struct PageParser {
    count_selector: Selector,
    review_selector: Selector,
}

impl PageParser {
    /// Compiles the two selectors
    ///
    /// # Arguments
    ///
    /// * `count_selector` - Selects the element holding the declared total
    /// * `review_selector` - Selects one element per review body
    ///
    /// # Returns
    ///
    /// * `Ok(PageParser)` - Both selectors compiled
    /// * `Err(ConfigError::InvalidSelector)` - A selector is not valid CSS
    pub fn new(count_selector: &str, review_selector: &str) -> ConfigResult<Self> {
        Ok(Self {
            count_selector: compile(count_selector)?,
            review_selector: compile(review_selector)?,
        })
    }

    pub fn from_config(config: &SourceConfig) -> ConfigResult<Self> {
        Self::new(&config.count_selector, &config.review_selector)
    }

    /// Reads the declared total from the page
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - The declared number of reviews
    /// * `Err(String)` - The count element is missing or its text is not numeric
    pub fn declared_total(&self, html: &str) -> Result<u64, String> {
        let document = Html::parse_document(html);

        let text = document
            .select(&self.count_selector)
            .next()
            .map(|element| element.text().collect::<String>())
            .ok_or_else(|| "review count element not found".to_string())?;

        parse_total_count(&text).ok_or_else(|| format!("unreadable review count {:?}", text.trim()))
    }

    /// Extracts the trimmed text of each review, in page order
    ///
    /// Empty review bodies are skipped.
    pub fn extract_reviews(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);

        document
            .select(&self.review_selector)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
            .collect()
    }
}

fn compile(selector: &str) -> ConfigResult<Selector> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Parses a declared total such as `"14 reviews"` or `"1,234 Reviews"`
///
/// Thousands separators are stripped and the leading token is read.
///
/// # Example
///
/// ```
/// use review_crawler::crawler::parse_total_count;
///
/// assert_eq!(parse_total_count("1,234 reviews"), Some(1234));
/// assert_eq!(parse_total_count("reviews"), None);
/// ```
pub fn parse_total_count(text: &str) -> Option<u64> {
    text.split_whitespace()
        .next()
        .map(|token| token.replace(',', ""))
        .and_then(|token| token.parse::<u64>().ok())
}
