use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_eid",
    "_pos",
    "_sid",
    "_ss",
    "ref",
];

/// Normalizes a URL into the key used for visited/queued bookkeeping
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an HTTP(S) scheme and a host
/// 3. Lowercase the host (done by the parser) and resolve dot segments
/// 4. Remove fragment (everything after #)
/// 5. Remove tracking query parameters
/// 6. Sort remaining query parameters by key, keeping relative order of
///    repeated keys
/// 7. Remove empty query string (trailing ?)
///
/// Scheme, `www.` and trailing slashes are kept: the normalized URL is also
/// the URL that gets fetched, so it must stay a URL the catalog serves.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::normalize_url;
///
/// let url = normalize_url("https://Shop.Example.com/sale?page=2&utm_source=mail#top").unwrap();
/// assert_eq!(url.as_str(), "https://shop.example.com/sale?page=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // Stable sort keeps repeated keys in their original order
    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme_and_www() {
        let result = normalize_url("http://www.example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://www.example.com/page");
    }

    #[test]
    fn test_keeps_trailing_slash() {
        let result = normalize_url("https://example.com/collections/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/collections/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_remove_tracking_params() {
        let result = normalize_url("https://example.com/page?utm_source=twitter").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = normalize_url("https://example.com/sale?view=grid&page=2").unwrap();
        assert_eq!(result.as_str(), "https://example.com/sale?page=2&view=grid");
    }

    #[test]
    fn test_equivalent_pagination_urls_normalize_equal() {
        let a = normalize_url("https://example.com/sale?page=2&view=grid#products").unwrap();
        let b = normalize_url("https://example.com/sale?view=grid&fbclid=x&page=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_path_with_dots() {
        let result = normalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_lowercase_host_keeps_path_case() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }
}
