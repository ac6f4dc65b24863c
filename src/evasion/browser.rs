//! Headless browser strategy, the most expensive fallback

use super::{FetchStrategy, StrategyContext};
use crate::fetch::{FetchOutcome, Transport};
use crate::StrategyError;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::time::Duration;

const NAME: &str = "browser";

/// Navigates to the page in headless Chrome and returns the rendered HTML
///
/// A fresh browser is launched per attempt and dropped afterwards. The
/// blocking browser API runs on tokio's blocking pool.
#[derive(Debug, Clone, Default)]
pub struct BrowserStrategy;

impl BrowserStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FetchStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn transport(&self) -> Transport {
        Transport::Browser
    }

    async fn attempt(&self, url: &str, ctx: &StrategyContext) -> Result<FetchOutcome, StrategyError> {
        let url = url.to_string();
        let user_agent = ctx.profile.user_agent.clone();
        let proxy = ctx.proxy.clone();
        let timeout = ctx.timeout;

        let (final_url, body) = tokio::task::spawn_blocking(move || {
            render_page(&url, &user_agent, proxy.as_deref(), timeout)
        })
        .await
        .map_err(|e| StrategyError::Launch {
            strategy: NAME,
            message: format!("browser task failed: {}", e),
        })??;

        if body.trim().is_empty() {
            return Ok(FetchOutcome::transport_failure("Browser rendered an empty page"));
        }

        // Navigation does not expose the HTTP status; rendered content counts as 200
        Ok(FetchOutcome::from_status(200, final_url, body, None))
    }
}

fn render_page(
    url: &str,
    user_agent: &str,
    proxy: Option<&str>,
    timeout: Duration,
) -> Result<(String, String), StrategyError> {
    let launch_error = |e: anyhow::Error| StrategyError::Launch {
        strategy: NAME,
        message: e.to_string(),
    };
    let transport_error = |e: anyhow::Error| StrategyError::Transport {
        strategy: NAME,
        message: e.to_string(),
    };

    let user_agent_arg = format!("--user-agent={}", user_agent);
    let proxy_arg = proxy.map(|p| format!("--proxy-server={}", p));

    let mut args = vec![
        OsStr::new("--disable-blink-features=AutomationControlled"),
        OsStr::new("--no-sandbox"),
        OsStr::new("--disable-dev-shm-usage"),
        OsStr::new(&user_agent_arg),
    ];
    if let Some(proxy_arg) = &proxy_arg {
        args.push(OsStr::new(proxy_arg));
    }

    let browser = Browser::new(LaunchOptions {
        headless: true,
        window_size: Some((1920, 1080)),
        args,
        ..Default::default()
    })
    .map_err(launch_error)?;

    let tab = browser.new_tab().map_err(launch_error)?;
    tab.set_default_timeout(timeout);

    tab.navigate_to(url).map_err(transport_error)?;
    tab.wait_until_navigated().map_err(transport_error)?;

    let body = tab.get_content().map_err(transport_error)?;
    Ok((tab.get_url(), body))
}
