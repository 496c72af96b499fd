//! Extraction of product offers from listing pages.
//!
//! A [`ProductSource`] yields raw page HTML; [`extract_products`] turns one page into
//! offers. A card that cannot be read is skipped and counted, and a page that cannot
//! be fetched is skipped and counted; neither aborts the run.

pub mod jumbo;
pub mod saved_pages;

pub use jumbo::HttpListingSource;
pub use saved_pages::HtmlDirSource;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::{COL_NAME, COL_PAGE, COL_PRICE};
use crate::error::Result;
use crate::observability::metrics;
use crate::table::ProductTable;
use crate::types::{ProductRecord, ScrapedProduct};

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article.product-container").expect("card selector is valid"));
static NAME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3.jum-heading.h6.title").expect("name selector is valid"));
static PRICE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.jum-price").expect("price selector is valid"));
static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"€\s*(\d+,\d+)").expect("price pattern is valid"));

/// Anything that can hand out listing pages one at a time
pub trait ProductSource {
    fn source_name(&self) -> &str;

    /// Number of pages this source will be asked for
    fn page_count(&self) -> usize;

    /// Raw HTML of the page at zero-based `page_index`
    fn fetch_page(&self, page_index: usize) -> Result<String>;
}

/// Offers found on one page plus the number of cards that were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionOutcome {
    pub products: Vec<ScrapedProduct>,
    pub skipped: usize,
}

/// Extract every product card on a page; `page` is the 1-based page number.
pub fn extract_products(html: &str, page: u32) -> ExtractionOutcome {
    let document = Html::parse_document(html);
    let mut outcome = ExtractionOutcome::default();

    for card in document.select(&CARD_SELECTOR) {
        match extract_item(card, page) {
            Some(product) => outcome.products.push(product),
            None => outcome.skipped += 1,
        }
    }
    outcome
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read one product card; `None` when its name or a valid price is missing.
fn extract_item(card: ElementRef<'_>, page: u32) -> Option<ScrapedProduct> {
    let Some(name) = card.select(&NAME_SELECTOR).next().map(element_text) else {
        warn!(page, "Error parsing item: no product title");
        return None;
    };
    if name.is_empty() {
        warn!(page, "Error parsing item: empty product title");
        return None;
    }

    let Some(price_raw) = card.select(&PRICE_SELECTOR).next().map(element_text) else {
        warn!(page, name = %name, "Error parsing item: no price element");
        return None;
    };

    let price = PRICE_RE
        .captures(&price_raw)
        .and_then(|caps| caps[1].replace(',', ".").parse::<f64>().ok());
    match price {
        Some(price) => Some(ScrapedProduct { name, price, page }),
        None => {
            warn!(page, "Skipping item (no valid price): {}", price_raw);
            None
        }
    }
}

/// Result of a complete scrape run
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub source: String,
    pub pages_requested: usize,
    pub pages_failed: usize,
    pub items_skipped: usize,
    pub products: usize,
    pub output_file: String,
}

/// Walk every page of `source` and write the offers to `output` as `name;price;page`.
#[instrument(skip_all, fields(source = %source.source_name()))]
pub fn run_scrape(source: &dyn ProductSource, output: &Path) -> Result<ScrapeResult> {
    let started = Instant::now();
    let pages = source.page_count();
    let mut records: Vec<ProductRecord> = Vec::new();
    let mut pages_failed = 0;
    let mut items_skipped = 0;

    for page_index in 0..pages {
        let page = (page_index + 1) as u32;
        info!("Scraping page {} of {}", page, pages);

        let html = match source.fetch_page(page_index) {
            Ok(html) => html,
            Err(e) => {
                error!(page, "Failed to fetch page: {}", e);
                metrics::scrape::page_failed();
                pages_failed += 1;
                continue;
            }
        };
        metrics::scrape::page_fetched();

        let outcome = extract_products(&html, page);
        debug!(
            page,
            extracted = outcome.products.len(),
            skipped = outcome.skipped,
            "Page extracted"
        );
        metrics::scrape::items(outcome.products.len(), outcome.skipped);
        items_skipped += outcome.skipped;
        records.extend(outcome.products.into_iter().map(ProductRecord::from));
    }

    let table = ProductTable::new(&[COL_NAME, COL_PRICE, COL_PAGE], records);
    table.save_quoted(output)?;
    metrics::table::written(table.len());
    metrics::stage_duration("scrape", started.elapsed().as_secs_f64());

    info!(
        products = table.len(),
        pages_failed, items_skipped, "Scraped products"
    );
    Ok(ScrapeResult {
        source: source.source_name().to_string(),
        pages_requested: pages,
        pages_failed,
        items_skipped,
        products: table.len(),
        output_file: output.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    const LISTING: &str = r#"
        <html><body>
          <article class="product-container">
            <h3 class="jum-heading h6 title">Douwe Egberts Aroma Rood Filterkoffie 500g</h3>
            <div class="jum-price"><span>€</span> <span>5,99</span></div>
          </article>
          <article class="product-container">
            <h3 class="jum-heading h6 title">  Lavazza Qualità Oro
                Bonen 1kg </h3>
            <div class="jum-price">€ 17,49 <span class="per-unit">€ 17,49 per kg</span></div>
          </article>
          <article class="product-container">
            <h3 class="jum-heading h6 title">Tijdelijk uitverkocht</h3>
            <div class="jum-price">€ 3,-</div>
          </article>
          <article class="product-container">
            <div class="jum-price">€ 2,19</div>
          </article>
          <article class="promo-banner">
            <h3 class="jum-heading h6 title">Not a product</h3>
          </article>
        </body></html>
    "#;

    #[test]
    fn test_extract_products_skips_bad_cards() {
        let outcome = extract_products(LISTING, 2);

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.products.len(), 2);
        assert_eq!(
            outcome.products[0],
            ScrapedProduct {
                name: "Douwe Egberts Aroma Rood Filterkoffie 500g".into(),
                price: 5.99,
                page: 2,
            }
        );
        assert_eq!(outcome.products[1].name, "Lavazza Qualità Oro Bonen 1kg");
        assert_eq!(outcome.products[1].price, 17.49);
    }

    #[test]
    fn test_empty_page() {
        let outcome = extract_products("<html><body></body></html>", 1);
        assert_eq!(outcome, ExtractionOutcome::default());
    }

    struct FlakySource;

    impl ProductSource for FlakySource {
        fn source_name(&self) -> &str {
            "flaky"
        }

        fn page_count(&self) -> usize {
            3
        }

        fn fetch_page(&self, page_index: usize) -> Result<String> {
            if page_index == 1 {
                Err(PipelineError::Config("page unavailable".into()))
            } else {
                Ok(LISTING.to_string())
            }
        }
    }

    #[test]
    fn test_run_scrape_skips_failed_pages() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("raw.csv");

        let result = run_scrape(&FlakySource, &output).unwrap();
        assert_eq!(result.pages_requested, 3);
        assert_eq!(result.pages_failed, 1);
        assert_eq!(result.items_skipped, 4);
        assert_eq!(result.products, 4);

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.starts_with("\"name\";\"price\";\"page\""));
        assert!(written.contains("\"Douwe Egberts Aroma Rood Filterkoffie 500g\";\"5.99\";\"3\""));
    }
}
