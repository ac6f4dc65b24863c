//! Spoofed command-line client strategy

use super::{FetchStrategy, StrategyContext};
use crate::fetch::{FetchOutcome, Transport};
use crate::StrategyError;
use async_trait::async_trait;
use tokio::process::Command;

const NAME: &str = "curl";

/// Marker separating the body from the status trailer in curl's output
const TRAILER_MARKER: &str = "\n__HARVEST_STATUS__ ";

/// Fetches through the `curl` binary, presenting the full browser profile
#[derive(Debug, Clone)]
pub struct CurlStrategy {
    binary: String,
}

impl CurlStrategy {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_command(&self, url: &str, ctx: &StrategyContext) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--silent")
            .arg("--show-error")
            .arg("--location")
            .arg("--compressed")
            .arg("--max-time")
            .arg(ctx.timeout.as_secs().max(1).to_string());

        for (name, value) in ctx.profile.header_pairs() {
            if name == "user-agent" {
                cmd.arg("--user-agent").arg(value);
            } else {
                cmd.arg("--header").arg(format!("{}: {}", name, value));
            }
        }

        if let Some(proxy) = &ctx.proxy {
            cmd.arg("--proxy").arg(proxy);
        }

        cmd.arg("--write-out")
            .arg(format!("{}%{{http_code}} %{{url_effective}}", TRAILER_MARKER))
            .arg(url)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl FetchStrategy for CurlStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn transport(&self) -> Transport {
        Transport::CommandLine
    }

    async fn attempt(&self, url: &str, ctx: &StrategyContext) -> Result<FetchOutcome, StrategyError> {
        let output = self
            .build_command(url, ctx)
            .output()
            .await
            .map_err(|e| StrategyError::Launch {
                strategy: NAME,
                message: format!("{}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(StrategyError::Transport {
                strategy: NAME,
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (status, final_url, body) =
            parse_curl_output(&stdout, url).map_err(|message| StrategyError::Response {
                strategy: NAME,
                message,
            })?;

        Ok(FetchOutcome::from_status(status, final_url, body, None))
    }
}

/// Splits curl's stdout into status code, final URL and body
///
/// The body is followed by the write-out trailer
/// `__HARVEST_STATUS__ <code> <effective url>`.
pub fn parse_curl_output(stdout: &str, requested_url: &str) -> Result<(u16, String, String), String> {
    let (body, trailer) = stdout
        .rsplit_once(TRAILER_MARKER)
        .ok_or_else(|| "status trailer missing".to_string())?;

    let mut parts = trailer.trim().splitn(2, ' ');
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| *code != 0)
        .ok_or_else(|| format!("unreadable status in trailer '{}'", trailer.trim()))?;

    let final_url = parts
        .next()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(requested_url)
        .to_string();

    Ok((status, final_url, body.to_string()))
}
