//! Listing page parser
//!
//! Extracts item records and pagination links from one catalog page:
//! - Item elements are matched by the item selector and handed to the
//!   caller's extractor in memory-bounded batches
//! - Pagination anchors are resolved against the page URL, normalized and
//!   kept only when they stay on the same site

use crate::crawler::extract::{Extractor, Record};
use crate::memory::BatchMemoryManager;
use crate::url::{is_same_site, normalize_url};
use crate::HarvestError;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::convert::Infallible;
use url::Url;

/// Compiled selectors for listing pages
#[derive(Debug, Clone)]
pub struct PageSelectors {
    pub item: Selector,
    pub pagination: Selector,
}

impl PageSelectors {
    pub fn new(item: &str, pagination: &str) -> Result<Self, HarvestError> {
        Ok(Self {
            item: compile(item)?,
            pagination: compile(pagination)?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, HarvestError> {
    Selector::parse(selector).map_err(|e| HarvestError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// What one listing page yielded
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Non-empty records in page order
    pub records: Vec<Record>,

    /// Normalized same-site pagination URLs in page order, deduplicated
    pub pagination_links: Vec<String>,

    /// Item elements matched on the page
    pub items_found: usize,

    /// Items the extractor rejected
    pub items_failed: usize,
}

/// Parses a listing page
///
/// # Arguments
///
/// * `html` - Page body
/// * `page_url` - Final URL of the page, used to resolve relative links
/// * `selectors` - Item and pagination selectors
/// * `extractor` - Turns each item element into a record
/// * `memory` - Batch manager bounding memory while extracting
/// * `batch_size` - Items per extraction batch
pub fn parse_listing(
    html: &str,
    page_url: &Url,
    selectors: &PageSelectors,
    extractor: &dyn Extractor,
    memory: &mut BatchMemoryManager,
    batch_size: usize,
) -> ParsedPage {
    let document = Html::parse_document(html);

    let items: Vec<ElementRef<'_>> = document.select(&selectors.item).collect();
    let mut items_failed = 0;

    let records = memory
        .process_in_batches(&items, batch_size, |chunk| {
            Ok::<_, Infallible>(extract_chunk(chunk, extractor, &mut items_failed))
        })
        .unwrap_or_else(|never| match never {});

    let pagination_links = extract_pagination_links(&document, &selectors.pagination, page_url);

    tracing::debug!(
        "Parsed {}: {} items, {} records, {} failed, {} pagination links",
        page_url,
        items.len(),
        records.len(),
        items_failed,
        pagination_links.len()
    );

    ParsedPage {
        records,
        pagination_links,
        items_found: items.len(),
        items_failed,
    }
}

/// Runs the extractor over one batch, isolating per-item failures
fn extract_chunk(chunk: &[ElementRef<'_>], extractor: &dyn Extractor, failed: &mut usize) -> Vec<Record> {
    let mut records = Vec::with_capacity(chunk.len());

    for element in chunk {
        match extractor.extract(*element) {
            Ok(record) if !record.is_empty() => records.push(record),
            Ok(_) => tracing::debug!("Skipping item that produced an empty record"),
            Err(e) => {
                *failed += 1;
                tracing::warn!("Failed to extract item: {}", e);
            }
        }
    }

    records
}

fn extract_pagination_links(document: &Html, selector: &Selector, page_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(absolute) = resolve_link(href, page_url) else {
            continue;
        };
        if !is_same_site(&absolute, page_url) {
            tracing::trace!("Ignoring off-site pagination link {}", absolute);
            continue;
        }

        match normalize_url(absolute.as_str()) {
            Ok(normalized) => {
                let normalized = normalized.to_string();
                if seen.insert(normalized.clone()) {
                    links.push(normalized);
                }
            }
            Err(e) => tracing::debug!("Skipping pagination link {}: {}", absolute, e),
        }
    }

    links
}

/// Resolves an href against the page URL
///
/// Returns None for empty and fragment-only hrefs, `javascript:`, `mailto:`,
/// `tel:` and `data:` links, and anything that is not HTTP(S) after
/// resolution.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then_some(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProbe;
    use crate::telemetry::TracingSink;
    use crate::ExtractionError;
    use serde_json::Value;
    use std::sync::Arc;

    struct NoProbe;

    impl MemoryProbe for NoProbe {
        fn resident_bytes(&mut self) -> Option<u64> {
            None
        }
    }

    fn memory() -> BatchMemoryManager {
        BatchMemoryManager::new(u64::MAX, Box::new(NoProbe), Arc::new(TracingSink))
    }

    fn selectors() -> PageSelectors {
        PageSelectors::new(".product-item", ".pagination a").unwrap()
    }

    fn page_url() -> Url {
        Url::parse("https://shop.example.com/collections/sale").unwrap()
    }

    fn title_extractor(element: ElementRef<'_>) -> Result<Record, ExtractionError> {
        let title = element.text().collect::<String>().trim().to_string();
        if title == "broken" {
            return Err(ExtractionError::Malformed("no price".into()));
        }
        let mut record = Record::new();
        if !title.is_empty() {
            record.insert("title".into(), Value::String(title));
        }
        Ok(record)
    }

    #[test]
    fn test_records_in_page_order() {
        let html = r#"
            <div class="product-item">one</div>
            <div class="product-item">two</div>
            <div class="product-item">three</div>
        "#;

        let page = parse_listing(html, &page_url(), &selectors(), &title_extractor, &mut memory(), 2);

        let titles: Vec<&Value> = page.records.iter().map(|r| &r["title"]).collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
        assert_eq!(page.items_found, 3);
    }

    #[test]
    fn test_failed_item_isolated() {
        let html = r#"
            <div class="product-item">one</div>
            <div class="product-item">broken</div>
            <div class="product-item">three</div>
        "#;

        let page = parse_listing(html, &page_url(), &selectors(), &title_extractor, &mut memory(), 50);

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.items_failed, 1);
    }

    #[test]
    fn test_empty_records_skipped() {
        let html = r#"<div class="product-item">  </div><div class="product-item">two</div>"#;

        let page = parse_listing(html, &page_url(), &selectors(), &title_extractor, &mut memory(), 50);

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.items_failed, 0);
    }

    #[test]
    fn test_pagination_links_resolved_and_filtered() {
        let html = r##"
            <nav class="pagination">
                <a href="?page=2&utm_source=x">2</a>
                <a href="/collections/sale?page=3">3</a>
                <a href="https://shop.example.com/collections/sale?page=2#top">2 again</a>
                <a href="https://other.example.com/collections/sale?page=4">elsewhere</a>
                <a href="#">current</a>
                <a href="javascript:void(0)">js</a>
                <a>no href</a>
            </nav>
        "##;

        let page = parse_listing(html, &page_url(), &selectors(), &title_extractor, &mut memory(), 50);

        assert_eq!(
            page.pagination_links,
            vec![
                "https://shop.example.com/collections/sale?page=2".to_string(),
                "https://shop.example.com/collections/sale?page=3".to_string(),
            ]
        );
    }

    #[test]
    fn test_invalid_selector() {
        assert!(PageSelectors::new("[[", ".pagination a").is_err());
    }

    #[test]
    fn test_resolve_link() {
        let base = page_url();
        assert_eq!(
            resolve_link("?page=2", &base).map(|u| u.to_string()),
            Some("https://shop.example.com/collections/sale?page=2".to_string())
        );
        assert!(resolve_link("mailto:a@b.c", &base).is_none());
        assert!(resolve_link("ftp://shop.example.com/x", &base).is_none());
        assert!(resolve_link("  ", &base).is_none());
    }
}
