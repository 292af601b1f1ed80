// src/storms/mod.rs

pub mod sink;
pub mod source;

use anyhow::{Context, Result};
use reqwest::Client;
use std::{path::PathBuf, sync::Arc, time::Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

use crate::config::Config;

pub use sink::{FileSink, StormSink};
pub use source::{BigQueryRest, QuerySource};

/// Name of the per-year table, and the stem of its output file.
pub fn table_id(year: i32) -> String {
    format!("storms_{}", year)
}

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub written: Vec<(i32, PathBuf)>,
    pub failed: Vec<(i32, String)>,
}

/// Export every configured year from BigQuery into the storms folder.
#[instrument(level = "info", skip_all)]
pub async fn run(cfg: &Config, client: &Client, years: &[i32]) -> Result<ExportSummary> {
    let source = BigQueryRest::from_config(&cfg.storms, client.clone())?;
    let sink = FileSink::new(cfg.resolve(&cfg.paths.storms_dir), cfg.storms.format)?;
    let summary = export_years(Arc::new(source), Arc::new(sink), years, cfg.storms.concurrency).await;
    info!(
        written = summary.written.len(),
        failed = summary.failed.len(),
        "storm export complete"
    );
    Ok(summary)
}

/// Fetch and write each year on its own task, with at most `concurrency`
/// years in flight. A failing year is logged and reported; the rest carry on.
pub async fn export_years(
    source: Arc<dyn QuerySource>,
    sink: Arc<dyn StormSink>,
    years: &[i32],
    concurrency: usize,
) -> ExportSummary {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(years.len());

    for &year in years {
        let source = source.clone();
        let sink = sink.clone();
        let sem = sem.clone();
        handles.push((
            year,
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.context("worker pool closed")?;
                export_year(source.as_ref(), sink, year).await
            }),
        ));
    }

    let mut summary = ExportSummary::default();
    for (year, handle) in handles {
        match handle.await {
            Ok(Ok(path)) => summary.written.push((year, path)),
            Ok(Err(e)) => {
                let msg = format!("{:#}", e);
                error!(year, error = %msg, "year export failed");
                summary.failed.push((year, msg));
            }
            Err(e) => {
                error!(year, error = %e, "year export task panicked");
                summary.failed.push((year, e.to_string()));
            }
        }
    }
    summary
}

#[instrument(level = "info", skip(source, sink))]
async fn export_year(source: &dyn QuerySource, sink: Arc<dyn StormSink>, year: i32) -> Result<PathBuf> {
    let start = Instant::now();
    let batches = source
        .fetch_year(year)
        .await
        .with_context(|| format!("querying {}", table_id(year)))?;
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();

    let path = tokio::task::spawn_blocking(move || sink.write_year(year, &batches))
        .await?
        .with_context(|| format!("writing {}", table_id(year)))?;

    info!(rows, file = %path.display(), elapsed = ?start.elapsed(), "saved year");
    Ok(path)
}
