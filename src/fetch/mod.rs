//! Fetching the protected catalog
//!
//! Outcome classification, retry policy, fingerprint headers, proxies and
//! the retrying request executor.

mod backoff;
mod executor;
mod headers;
mod outcome;
mod proxy;
mod session;

pub use backoff::{delay, delay_for_outcome, should_retry, RetryPolicy};
pub(crate) use executor::classify_reqwest_error;
pub use executor::{build_http_client, RequestExecutor};
pub use headers::{
    BrowserProfile, HeaderProfile, HeaderProfileGenerator, RefererPolicy, BROWSER_PROFILES,
};
pub use outcome::{parse_retry_after, FetchAttempt, FetchOutcome, OutcomeKind, Transport};
pub use proxy::{parse_proxy_list, read_proxy_list, ProxyPool, ProxyRecord};
pub use session::CrawlSession;
