//! HTTP layer: bounded-retry GET, metadata-only reachability checks, and
//! file downloads.
//!
//! All network access in the pipeline funnels through this module. Requests
//! carry the crate User-Agent and a fixed timeout; transient failures
//! (connect errors, timeouts, 5xx) are retried a small, bounded number of
//! times with fixed backoff. Everything else fails immediately.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::ReleaseError;

/// User-Agent header sent with every request.
const USER_AGENT: &str = "bombom-release";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum GET attempts per URL.
const FETCH_ATTEMPTS: u32 = 3;

/// Fixed pause between retry attempts.
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Build the shared HTTP client.
fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Drive a future to completion on a throwaway current-thread runtime.
///
/// The pipeline is strictly sequential, so a per-call runtime keeps the
/// public API synchronous without holding an executor across the run.
fn run_blocking<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create Tokio runtime for HTTP request")?;
    runtime.block_on(fut)
}

/// GET a URL, retrying transient failures up to the attempt budget.
///
/// 5xx responses and transport errors count as transient; any other
/// non-success status fails immediately. Exhausting the budget yields a
/// fetch error naming the last failure.
async fn get_with_retry(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let mut last_failure = String::new();

    for attempt in 1..=FETCH_ATTEMPTS {
        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                if !status.is_server_error() {
                    return Err(ReleaseError::Fetch {
                        url: url.to_string(),
                        attempts: attempt,
                        reason: format!("HTTP {status}"),
                    }
                    .into());
                }
                last_failure = format!("HTTP {status}");
            }
            Err(e) => last_failure = e.to_string(),
        }

        if attempt < FETCH_ATTEMPTS {
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }

    Err(ReleaseError::Fetch {
        url: url.to_string(),
        attempts: FETCH_ATTEMPTS,
        reason: last_failure,
    }
    .into())
}

/// Fetch a URL's body as text.
pub fn fetch_text(url: &str) -> Result<String> {
    let client = build_client()?;
    run_blocking(async move {
        let response = get_with_retry(&client, url).await?;
        response
            .text()
            .await
            .with_context(|| format!("failed to read response body from {url}"))
    })
}

/// Issue a metadata-only HEAD request and return the response status code.
///
/// Redirects are followed; the returned status is the final one. Transport
/// failures are errors, non-success statuses are not: callers decide what
/// counts as reachable.
pub fn head_status(url: &str) -> Result<u16> {
    let client = build_client()?;
    run_blocking(async move {
        let response = client
            .head(url)
            .send()
            .await
            .with_context(|| format!("HEAD request to {url} failed"))?;
        Ok(response.status().as_u16())
    })
}

/// Download a URL to `dest_dir/filename`. Returns the written path.
pub fn download_to_file(url: &str, dest_dir: &Path, filename: &str) -> Result<PathBuf> {
    let client = build_client()?;
    let bytes = run_blocking(async move {
        let response = get_with_retry(&client, url).await?;
        response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body for '{filename}'"))
    })?;

    let dest_path = dest_dir.join(filename);
    std::fs::write(&dest_path, &bytes)
        .with_context(|| format!("failed to write '{filename}' to {}", dest_path.display()))?;

    Ok(dest_path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
