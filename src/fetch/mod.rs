// src/fetch/mod.rs

pub mod download;
pub mod links;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

pub use download::download_file;
pub use links::extract_links;

/// GET `url` and return the body as text.
pub async fn get_text(client: &Client, url: &Url) -> Result<String> {
    debug!("fetching text from {}", url);
    client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("non-success status {}", url))?
        .text()
        .await
        .with_context(|| format!("reading text from {}", url))
}

/// Fetch the page at `page` and return every link on it ending in `suffix`.
pub async fn discover_links(client: &Client, page: &Url, suffix: &str) -> Result<Vec<Url>> {
    let html = get_text(client, page).await?;
    Ok(extract_links(&html, page, suffix))
}
