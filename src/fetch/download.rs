// src/fetch/download.rs

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use url::Url;

/// File name a download of `url` is stored under: the last path segment,
/// lower-cased.
pub fn local_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.bin")
        .to_lowercase()
}

/// Download `url` into `dest_dir` under [`local_file_name`], overwriting any
/// previous copy. Returns the full path of the saved file.
pub async fn download_file(client: &Client, url: &Url, dest_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    let dest_path = dest_dir.join(local_file_name(url));

    fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("creating {}", dest_dir.display()))?;

    let response = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;

    let mut file = fs::File::create(&dest_path)
        .await
        .with_context(|| format!("creating {}", dest_path.display()))?;
    let mut stream = response.bytes_stream();
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("reading body from {}", url))?;
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    file.flush().await?;
    debug!(bytes = total, file = %dest_path.display(), "download complete");

    Ok(dest_path)
}
