use reqwest::blocking::Client;
use std::thread;
use std::time::Duration;
use tracing::debug;

use super::ProductSource;
use crate::config::ScraperConfig;
use crate::error::Result;

/// Live listing pages fetched over HTTP, paged by an item offset
pub struct HttpListingSource {
    client: Client,
    name: String,
    base_url: String,
    items_per_page: usize,
    max_pages: usize,
    delay: Duration,
}

impl HttpListingSource {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            name: config.source_name.clone(),
            base_url: config.base_url.clone(),
            items_per_page: config.items_per_page,
            max_pages: config.max_pages,
            delay: Duration::from_millis(config.delay_ms),
        })
    }

    /// Listing URL for a zero-based page index; the offset is appended to the base URL.
    pub fn page_url(&self, page_index: usize) -> String {
        format!("{}{}", self.base_url, page_index * self.items_per_page)
    }
}

impl ProductSource for HttpListingSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn page_count(&self) -> usize {
        self.max_pages
    }

    fn fetch_page(&self, page_index: usize) -> Result<String> {
        // pause between consecutive requests
        if page_index > 0 && !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let url = self.page_url(page_index);
        debug!(url = %url, "Fetching listing page");
        let response = self.client.get(&url).send()?.error_for_status()?;
        Ok(response.text()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_uses_item_offset() {
        let source = HttpListingSource::new(&ScraperConfig::default()).unwrap();
        assert_eq!(
            source.page_url(0),
            "https://www.jumbo.com/producten/koffie-en-thee/?offSet=0"
        );
        assert_eq!(
            source.page_url(2),
            "https://www.jumbo.com/producten/koffie-en-thee/?offSet=48"
        );
        assert_eq!(source.page_count(), 34);
        assert_eq!(source.source_name(), "jumbo");
    }
}
