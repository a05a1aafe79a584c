//! One-shot fetch of a page listing image URLs.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};

use crate::domain::errors::{CacheError, CacheResult};

static IMAGE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?:[^\s"'<>]*?\.(?:jpe?g|png|webp)"#).expect("valid image url regex")
});

/// Extracts image URLs from arbitrary text (HTML, JSON, plain).
///
/// Matches are non-greedy, so each URL ends at its first image extension.
/// JSON-escaped slashes are unescaped. Order is preserved, duplicates dropped.
#[must_use]
pub fn extract_image_urls(content: &str) -> Vec<String> {
    if !content.contains("http") {
        return Vec::new();
    }

    let mut urls: Vec<String> = Vec::new();
    for m in IMAGE_URL_RE.find_iter(content) {
        let url = m.as_str().replace("\\/", "/");
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Downloads a listing page.
#[derive(Debug, Clone)]
pub struct ListingClient {
    client: Client,
}

impl ListingClient {
    /// Creates a client with the given request timeout.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(timeout: Duration) -> CacheResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetches `url` and returns the image URLs it mentions.
    ///
    /// # Errors
    /// Returns a network error if the page cannot be fetched.
    pub async fn fetch_image_urls(&self, url: &str) -> CacheResult<Vec<String>> {
        debug!(url, "Fetching listing");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::Network(format!("listing request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| CacheError::Network(format!("failed to read listing: {e}")))?;
        let urls = extract_image_urls(&text);
        info!(url, count = urls.len(), "Listing fetched");
        Ok(urls)
    }
}
