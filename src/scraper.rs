use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tracing::info;

const DEFAULT_SOURCE_URL: &str = "https://www.openlane.eu/en/findcar";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// The external listings page, overridable via `SOURCE_URL`.
pub fn source_url() -> String {
    std::env::var("SOURCE_URL").unwrap_or_else(|_| DEFAULT_SOURCE_URL.to_string())
}

/// HTTP client for scraping. The timeout is a hard cap: a hanging remote
/// surfaces as a fetch error instead of stalling the run indefinitely.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build http client")
}

/// Fetch the listings page HTML with browser-like headers.
pub async fn fetch_listing_page(client: &Client, url: &str) -> Result<String> {
    let start = Instant::now();
    let res = client
        .get(url)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.5")
        .header("Cache-Control", "no-cache")
        .header("Pragma", "no-cache")
        .send()
        .await
        .with_context(|| format!("failed to fetch {}", url))?;

    if !res.status().is_success() {
        bail!("failed to fetch {}: status {}", url, res.status());
    }

    let html = res.text().await.context("failed to read response body")?;
    info!(
        url,
        bytes = html.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "fetched listings page"
    );
    Ok(html)
}
