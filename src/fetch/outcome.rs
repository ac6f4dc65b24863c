//! Fetch attempts and their classified outcomes

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// The transport that carried a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// The default HTTP client used by the request executor
    Direct,
    /// A spoofed command-line HTTP client
    CommandLine,
    /// A persistent cookie-aware HTTP session
    Session,
    /// A headless browser performing full navigation
    Browser,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::CommandLine => "command-line",
            Self::Session => "session",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request attempt, created before sending and discarded once its
/// outcome is classified
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub url: String,
    /// Zero-based attempt index within one logical fetch
    pub attempt_number: u32,
    pub transport: Transport,
    pub headers: Vec<(String, String)>,
    pub proxy: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Result of a fetch, classified into exactly one kind
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// HTTP 200 with a body
    Success {
        status_code: u16,
        /// Final URL after redirects
        final_url: String,
        body: String,
    },

    /// HTTP 403: the target refused us
    Blocked { status_code: u16 },

    /// HTTP 429, with the server's wait hint when it sent one
    RateLimited {
        status_code: u16,
        retry_after: Option<Duration>,
    },

    /// Any other non-200 status
    TransientError { status_code: u16 },

    /// The request never produced an HTTP response
    TransportFailure {
        error: String,
        /// True when retrying cannot help (malformed URL, unbuildable request)
        permanent: bool,
    },
}

/// Discriminant of a `FetchOutcome`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Blocked,
    RateLimited,
    TransientError,
    TransportFailure,
}

impl FetchOutcome {
    /// Classifies an HTTP response status
    ///
    /// | Status | Outcome |
    /// |--------|---------|
    /// | 200 | Success |
    /// | 403 | Blocked |
    /// | 429 | RateLimited (with `Retry-After` hint) |
    /// | anything else | TransientError |
    pub fn from_status(
        status_code: u16,
        final_url: String,
        body: String,
        retry_after: Option<Duration>,
    ) -> Self {
        match status_code {
            200 => Self::Success {
                status_code,
                final_url,
                body,
            },
            403 => Self::Blocked { status_code },
            429 => Self::RateLimited {
                status_code,
                retry_after,
            },
            _ => Self::TransientError { status_code },
        }
    }

    /// A retryable transport failure
    pub fn transport_failure(error: impl Into<String>) -> Self {
        Self::TransportFailure {
            error: error.into(),
            permanent: false,
        }
    }

    /// A transport failure that retrying cannot fix
    pub fn permanent_failure(error: impl Into<String>) -> Self {
        Self::TransportFailure {
            error: error.into(),
            permanent: true,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success { .. } => OutcomeKind::Success,
            Self::Blocked { .. } => OutcomeKind::Blocked,
            Self::RateLimited { .. } => OutcomeKind::RateLimited,
            Self::TransientError { .. } => OutcomeKind::TransientError,
            Self::TransportFailure { .. } => OutcomeKind::TransportFailure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// HTTP status code, when the attempt got a response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { status_code, .. }
            | Self::Blocked { status_code }
            | Self::RateLimited { status_code, .. }
            | Self::TransientError { status_code } => Some(*status_code),
            Self::TransportFailure { .. } => None,
        }
    }

    /// Response body of a successful fetch
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Success { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Error description of a transport failure
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::TransportFailure { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Server-provided wait hint of a rate-limited outcome
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { status_code, .. } => write!(f, "success (HTTP {})", status_code),
            Self::Blocked { status_code } => write!(f, "blocked (HTTP {})", status_code),
            Self::RateLimited {
                status_code,
                retry_after,
            } => match retry_after {
                Some(wait) => write!(
                    f,
                    "rate limited (HTTP {}, retry after {:?})",
                    status_code, wait
                ),
                None => write!(f, "rate limited (HTTP {})", status_code),
            },
            Self::TransientError { status_code } => {
                write!(f, "transient error (HTTP {})", status_code)
            }
            Self::TransportFailure { error, permanent } => {
                if *permanent {
                    write!(f, "permanent transport failure: {}", error)
                } else {
                    write!(f, "transport failure: {}", error)
                }
            }
        }
    }
}

/// Parses a `Retry-After` header value in its delta-seconds form
///
/// HTTP-date values are ignored; the status-code backoff covers them.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
