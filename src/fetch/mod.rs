mod client;
mod basic;
pub mod auth;

pub use client::HttpClient;
pub use basic::BasicClient;

use anyhow::{Context, Result, bail};
use std::time::Duration;
use tracing::warn;

/// Number of attempts before a fetch is reported as a source failure.
const MAX_ATTEMPTS: u32 = 3;

/// Fetches a URL as UTF-8 text, retrying transient failures with a short
/// exponential backoff. Network errors and 5xx/429 responses are retried;
/// any other non-2xx status fails immediately.
pub async fn fetch_text<C: HttpClient>(client: &C, url: &str) -> Result<String> {
    let parsed: reqwest::Url = url.parse().with_context(|| format!("invalid URL: {url}"))?;

    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let req = reqwest::Request::new(reqwest::Method::GET, parsed.clone());

        match client.execute(req).await {
            Ok(resp) if resp.status().is_success() => {
                return resp.text().await.context("reading response body");
            }
            Ok(resp) => {
                let status = resp.status();
                let err = anyhow::anyhow!("HTTP {status} from {url}");
                if !status.is_server_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
                    return Err(err);
                }
                last_err = Some(err);
            }
            Err(e) => {
                last_err = Some(anyhow::Error::new(e).context(format!("request to {url} failed")));
            }
        }

        if attempt < MAX_ATTEMPTS {
            let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
            warn!(url, attempt, backoff_ms = backoff.as_millis() as u64, "Fetch failed, retrying");
            tokio::time::sleep(backoff).await;
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => bail!("fetch of {url} failed"),
    }
}
