//! URL handling module for Catalog-Harvest
//!
//! This module provides URL normalization for the crawl's visited set, plus
//! the small origin helpers used by warmup and referrer sequencing.

mod normalize;

use crate::UrlError;
use url::Url;

// Re-export main functions
pub use normalize::normalize_url;

/// Returns the site root (`scheme://host[:port]/`) of a URL
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::site_root;
///
/// let root = site_root("https://shop.example.com/collections/sale?page=3").unwrap();
/// assert_eq!(root, "https://shop.example.com/");
/// ```
pub fn site_root(url_str: &str) -> Result<String, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    let host = url.host_str().ok_or(UrlError::MissingHost)?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    })
}

/// Returns the lowercase host of a URL, without any `www.` prefix
pub fn host_name(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Returns true if both URLs point at the same host and port
pub fn is_same_site(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// The default low-suspicion warmup chain for an entry URL: site root, then
/// the catalog's category overview
pub fn default_warmup_chain(entry_url: &str) -> Result<Vec<String>, UrlError> {
    let root = site_root(entry_url)?;
    let overview = format!("{}collections", root);
    Ok(vec![root, overview])
}
