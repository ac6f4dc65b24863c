//! Browser fingerprint header profiles
//!
//! Every request presents a header set copied from a real browser build. A
//! profile's user agent, platform, client hints and accept headers always come
//! from the same table row, so a Windows user agent never travels with macOS
//! client hints.

use crate::fetch::session::CrawlSession;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// One internally-consistent browser fingerprint
#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub platform: &'static str,
    pub accept: &'static str,
    /// `Sec-CH-UA*` hints; empty for browsers that do not send them
    pub client_hints: &'static [(&'static str, &'static str)],
    pub accept_languages: &'static [&'static str],
}

const HTML_ACCEPT_CHROMIUM: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const HTML_ACCEPT_FIREFOX: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const HTML_ACCEPT_SAFARI: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

const US_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-US,en;q=0.8", "en-US,en;q=0.9,es;q=0.8"];

pub const BROWSER_PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        name: "chrome-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        platform: "Windows",
        accept: HTML_ACCEPT_CHROMIUM,
        client_hints: &[
            ("sec-ch-ua", "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Windows\""),
        ],
        accept_languages: US_LANGUAGES,
    },
    BrowserProfile {
        name: "chrome-macos",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        platform: "macOS",
        accept: HTML_ACCEPT_CHROMIUM,
        client_hints: &[
            ("sec-ch-ua", "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"macOS\""),
        ],
        accept_languages: US_LANGUAGES,
    },
    BrowserProfile {
        name: "edge-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
        platform: "Windows",
        accept: HTML_ACCEPT_CHROMIUM,
        client_hints: &[
            ("sec-ch-ua", "\"Chromium\";v=\"124\", \"Microsoft Edge\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Windows\""),
        ],
        accept_languages: US_LANGUAGES,
    },
    BrowserProfile {
        name: "firefox-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        platform: "Windows",
        accept: HTML_ACCEPT_FIREFOX,
        client_hints: &[],
        accept_languages: &["en-US,en;q=0.5"],
    },
    BrowserProfile {
        name: "firefox-macos",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:125.0) Gecko/20100101 Firefox/125.0",
        platform: "macOS",
        accept: HTML_ACCEPT_FIREFOX,
        client_hints: &[],
        accept_languages: &["en-US,en;q=0.5"],
    },
    BrowserProfile {
        name: "safari-macos",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        platform: "macOS",
        accept: HTML_ACCEPT_SAFARI,
        client_hints: &[],
        accept_languages: &["en-US,en;q=0.9"],
    },
];

/// Headers that real browsers send but that do not change the response
const OPTIONAL_HEADERS: &[(&str, &str)] = &[
    ("upgrade-insecure-requests", "1"),
    ("sec-fetch-user", "?1"),
    ("dnt", "1"),
    ("cache-control", "max-age=0"),
];

/// Where the `Referer` of a request points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefererPolicy {
    /// A search results page for the target
    SearchQuery,
    /// The search engine's front page
    SearchEngineRoot,
    /// The target site's own root
    SiteRoot,
}

/// Headers for one request attempt; never persisted
#[derive(Debug, Clone)]
pub struct HeaderProfile {
    pub user_agent: String,
    pub platform: String,
    pub accept: String,
    pub accept_language: String,
    pub client_hints: Vec<(String, String)>,
    pub referer_policy: RefererPolicy,
    pub referer: String,
    /// Non-essential headers that survived random omission
    pub optional_headers: Vec<(String, String)>,
}

impl HeaderProfile {
    /// All headers as name/value pairs, in browser send order
    ///
    /// `Accept-Encoding` is absent: each transport negotiates compression
    /// itself so it can decode what it asked for.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(8 + self.client_hints.len());
        pairs.extend(self.client_hints.iter().cloned());
        pairs.push(("user-agent".to_string(), self.user_agent.clone()));
        pairs.push(("accept".to_string(), self.accept.clone()));
        pairs.push(("accept-language".to_string(), self.accept_language.clone()));
        pairs.push(("referer".to_string(), self.referer.clone()));
        pairs.push(("sec-fetch-dest".to_string(), "document".to_string()));
        pairs.push(("sec-fetch-mode".to_string(), "navigate".to_string()));
        pairs.push(("sec-fetch-site".to_string(), self.fetch_site().to_string()));
        pairs.extend(self.optional_headers.iter().cloned());
        pairs
    }

    /// Converts the profile into a reqwest header map
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in self.header_pairs() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => tracing::trace!("Skipping unrepresentable header {}", name),
            }
        }
        map
    }

    /// `Sec-Fetch-Site` consistent with the referrer
    fn fetch_site(&self) -> &'static str {
        match self.referer_policy {
            RefererPolicy::SiteRoot => "same-origin",
            RefererPolicy::SearchQuery | RefererPolicy::SearchEngineRoot => "cross-site",
        }
    }
}

/// Produces randomized, internally-consistent header profiles
#[derive(Debug, Clone)]
pub struct HeaderProfileGenerator {
    site_root: String,
    search_engine: String,
    search_query: String,
    omit_probability: f64,
}

impl HeaderProfileGenerator {
    /// # Arguments
    ///
    /// * `site_root` - Root URL of the target site (`https://host/`)
    /// * `search_engine` - Search engine origin used for referrers
    /// * `search_query` - Query that "found" the target
    /// * `omit_probability` - Chance each non-essential header is left out
    pub fn new(
        site_root: impl Into<String>,
        search_engine: impl Into<String>,
        search_query: impl Into<String>,
        omit_probability: f64,
    ) -> Self {
        Self {
            site_root: site_root.into(),
            search_engine: search_engine.into().trim_end_matches('/').to_string(),
            search_query: search_query.into(),
            omit_probability: omit_probability.clamp(0.0, 1.0),
        }
    }

    /// Generates the profile for the session's next request
    pub fn next_for(&self, session: &mut CrawlSession) -> HeaderProfile {
        let index = session.next_request_index();
        let established = session.is_established();
        self.generate(index, established, session.rng())
    }

    /// Generates the profile for request number `request_index` (1-based)
    ///
    /// Referrer sequencing: request 1 comes from a search results page,
    /// request 2 from the search engine root, later requests from the site
    /// root once the session is established, otherwise a random pick of the
    /// three.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        request_index: u32,
        established: bool,
        rng: &mut R,
    ) -> HeaderProfile {
        let browser = BROWSER_PROFILES
            .choose(rng)
            .copied()
            .unwrap_or(BROWSER_PROFILES[0]);

        let accept_language = browser
            .accept_languages
            .choose(rng)
            .copied()
            .unwrap_or("en-US,en;q=0.9");

        let referer_policy = match request_index {
            1 => RefererPolicy::SearchQuery,
            2 => RefererPolicy::SearchEngineRoot,
            _ if established => RefererPolicy::SiteRoot,
            _ => match rng.gen_range(0..3) {
                0 => RefererPolicy::SearchQuery,
                1 => RefererPolicy::SearchEngineRoot,
                _ => RefererPolicy::SiteRoot,
            },
        };

        let optional_headers = OPTIONAL_HEADERS
            .iter()
            .filter(|_| !rng.gen_bool(self.omit_probability))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        HeaderProfile {
            user_agent: browser.user_agent.to_string(),
            platform: browser.platform.to_string(),
            accept: browser.accept.to_string(),
            accept_language: accept_language.to_string(),
            client_hints: browser
                .client_hints
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            referer: self.referer_for(&referer_policy),
            referer_policy,
            optional_headers,
        }
    }

    fn referer_for(&self, policy: &RefererPolicy) -> String {
        match policy {
            RefererPolicy::SearchQuery => {
                let query: String =
                    ::url::form_urlencoded::byte_serialize(self.search_query.as_bytes()).collect();
                format!("{}/search?q={}", self.search_engine, query)
            }
            RefererPolicy::SearchEngineRoot => format!("{}/", self.search_engine),
            RefererPolicy::SiteRoot => self.site_root.clone(),
        }
    }
}
