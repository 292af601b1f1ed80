// src/insurance/mod.rs

pub mod normalize;
pub mod page;

use anyhow::{Context, Result};
use reqwest::Client;
use std::{fs, path::Path, path::PathBuf};
use tracing::{info, instrument, warn};
use url::Url;

use crate::{config::Config, fetch};

pub use normalize::{normalize, InsuranceRecord, TableSection};

/// Fetch the premiums archive page, normalize every yearly table and write
/// the combined CSV. Returns the output path and the number of records.
#[instrument(level = "info", skip_all)]
pub async fn run(cfg: &Config, client: &Client) -> Result<(PathBuf, usize)> {
    let url = Url::parse(&cfg.insurance.source_url)
        .with_context(|| format!("parsing source URL {}", cfg.insurance.source_url))?;
    let html = fetch::get_text(client, &url).await?;

    let sections = page::extract_sections(&html, &cfg.insurance.heading_marker);
    info!(sections = sections.len(), "extracted yearly tables");

    let normalized = normalize(&sections);
    if !normalized.dropped.is_empty() {
        warn!(dropped = normalized.dropped.len(), "some tables or records were dropped");
        for d in &normalized.dropped {
            warn!(at = %d.at, reason = %d.reason, "dropped");
        }
    }

    let out_dir = cfg.resolve(&cfg.paths.insurance_dir);
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let out_path = out_dir.join(&cfg.insurance.output_file);
    write_csv(&normalized.records, &out_path)?;

    info!(
        records = normalized.records.len(),
        output = %out_path.display(),
        "insurance table complete"
    );
    Ok((out_path, normalized.records.len()))
}

/// Write the relation as CSV with a header row, replacing any existing file.
pub fn write_csv(records: &[InsuranceRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for r in records {
        writer.serialize(r)?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}
