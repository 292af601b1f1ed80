// src/migration/mod.rs

pub mod grid;
pub mod normalize;
pub mod workbook;

use anyhow::{Context, Result};
use futures::{stream::FuturesUnordered, StreamExt};
use rayon::prelude::*;
use reqwest::Client;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::{config::Config, fetch};

pub use grid::{Cell, SheetGrid};
pub use normalize::{normalize, FlowRecord, MigrationOptions};

/// Result of processing one raw spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub output: PathBuf,
    pub records: usize,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct MigrationSummary {
    pub download_failed: Vec<(Url, String)>,
    pub written: Vec<FileOutcome>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Files saved and links that could not be fetched.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<(Url, String)>,
}

/// Download every spreadsheet linked from the census page, then normalize the
/// raw folder into the cleaned folder.
#[instrument(level = "info", skip_all)]
pub async fn run(cfg: &Config, client: &Client) -> Result<MigrationSummary> {
    let raw_dir = cfg.resolve(&cfg.paths.census_raw_dir);
    let cleaned_dir = cfg.resolve(&cfg.paths.census_cleaned_dir);
    for d in [&raw_dir, &cleaned_dir] {
        fs::create_dir_all(d).with_context(|| format!("creating {}", d.display()))?;
    }

    let page = Url::parse(&cfg.migration.source_url)
        .with_context(|| format!("parsing source URL {}", cfg.migration.source_url))?;
    let links = fetch::discover_links(client, &page, ".xls").await?;
    info!(count = links.len(), "found spreadsheet links");

    let downloads = download_all(client, links, &raw_dir, cfg.migration.download_concurrency).await;
    if !downloads.failed.is_empty() {
        warn!(
            failed = downloads.failed.len(),
            saved = downloads.saved.len(),
            "some downloads failed, older raw files may be processed"
        );
    }

    let opts = MigrationOptions::from_config(&cfg.migration)?;
    let files = list_raw_files(&raw_dir, &cfg.migration.skip_files)?;
    info!(count = files.len(), dir = %raw_dir.display(), "normalizing raw spreadsheets");

    let mut summary =
        tokio::task::spawn_blocking(move || process_files(&files, &cleaned_dir, &opts)).await?;
    summary.download_failed = downloads.failed;
    info!(
        download_failed = summary.download_failed.len(),
        written = summary.written.len(),
        failed = summary.failed.len(),
        "migration tables complete"
    );
    Ok(summary)
}

/// Fetch `links` into `dest_dir`, at most `concurrency` at a time. A failed
/// link is logged and reported without stopping the rest.
pub async fn download_all(client: &Client, links: Vec<Url>, dest_dir: &Path, concurrency: usize) -> DownloadReport {
    let concurrency = concurrency.max(1);
    let mut tasks = FuturesUnordered::new();
    let mut report = DownloadReport::default();

    let mut record = |res: (Url, Result<PathBuf>)| match res {
        (_, Ok(path)) => {
            info!(file = %path.display(), "saved");
            report.saved.push(path);
        }
        (url, Err(e)) => {
            let msg = format!("{:#}", e);
            error!(%url, error = %msg, "download failed");
            report.failed.push((url, msg));
        }
    };

    for url in links {
        info!(%url, "downloading");
        tasks.push(async move {
            let res = fetch::download_file(client, &url, dest_dir).await;
            (url, res)
        });
        if tasks.len() >= concurrency {
            if let Some(res) = tasks.next().await {
                record(res);
            }
        }
    }
    while let Some(res) = tasks.next().await {
        record(res);
    }
    report
}

/// `*.xls` files in `dir`, sorted, minus any whose name is in `skip`.
pub fn list_raw_files(dir: &Path, skip: &[String]) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*.xls", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .context("invalid glob pattern for raw spreadsheets")?
        .filter_map(|entry| entry.ok())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| !skip.iter().any(|s| s == n))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Normalize each file independently on the rayon pool. A file that fails
/// does not stop the others.
pub fn process_files(files: &[PathBuf], out_dir: &Path, opts: &MigrationOptions) -> MigrationSummary {
    let results: Vec<(PathBuf, Result<FileOutcome>)> = files
        .par_iter()
        .map(|f| (f.clone(), process_file(f, out_dir, opts)))
        .collect();

    let mut summary = MigrationSummary::default();
    for (source, res) in results {
        match res {
            Ok(outcome) => summary.written.push(outcome),
            Err(e) => {
                error!(file = %source.display(), error = %e, "skipping spreadsheet");
                summary.failed.push((source, format!("{:#}", e)));
            }
        }
    }
    summary
}

/// Read, normalize and write one raw spreadsheet.
#[instrument(level = "info", skip_all, fields(file = %source.display()))]
pub fn process_file(source: &Path, out_dir: &Path, opts: &MigrationOptions) -> Result<FileOutcome> {
    let start = Instant::now();
    let grid = workbook::read_grid(source)?;
    let normalized = normalize(&grid, opts)?;

    if !normalized.dropped.is_empty() {
        warn!(dropped = normalized.dropped.len(), "dropped unparseable records");
        for d in &normalized.dropped {
            debug!(at = %d.at, reason = %d.reason, "dropped record");
        }
    }

    let name = workbook::cleaned_file_name(source)
        .with_context(|| format!("no usable file name in {}", source.display()))?;
    let output = out_dir.join(name);
    workbook::write_flows(&normalized.records, &output)?;

    info!(
        records = normalized.records.len(),
        output = %output.display(),
        elapsed = ?start.elapsed(),
        "saved cleaned table"
    );
    Ok(FileOutcome {
        source: source.to_path_buf(),
        output,
        records: normalized.records.len(),
        dropped: normalized.dropped.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use rust_xlsxwriter::Workbook;
    use tempfile::tempdir;

    fn write_raw(path: &Path, rows: &[Vec<&str>]) -> Result<()> {
        let mut wb = Workbook::new();
        let sheet = wb.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                if v.is_empty() {
                    continue;
                }
                match v.parse::<f64>() {
                    Ok(n) => sheet.write_number(r as u32, c as u16, n)?,
                    Err(_) => sheet.write_string(r as u32, c as u16, *v)?,
                };
            }
        }
        wb.save(path)?;
        Ok(())
    }

    fn census_rows<'a>(body: Vec<Vec<&'a str>>) -> Vec<Vec<&'a str>> {
        let mut rows: Vec<Vec<&str>> = vec![vec!["Table 1. State-to-State Migration Flows"]];
        rows.resize(6, vec![]);
        rows.push(vec!["Current residence in", "Alabama", "", "Alaska", ""]);
        rows.push(vec!["", "Estimate", "MOE", "Estimate", "MOE"]);
        rows.extend(body);
        rows
    }

    #[test]
    fn listing_skips_combined_workbook() -> Result<()> {
        let dir = tempdir()?;
        for name in [
            "state_to_state_migrations_table_2019.xls",
            "state_to_state_migrations_table_2018.xls",
            "state_migration_flows_tables.xls",
            "readme.txt",
        ] {
            fs::write(dir.path().join(name), b"")?;
        }

        let files = list_raw_files(dir.path(), &["state_migration_flows_tables.xls".to_string()])?;
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "state_to_state_migrations_table_2018.xls",
                "state_to_state_migrations_table_2019.xls"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_links_are_reported() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let links = vec![
            Url::parse("http://127.0.0.1:1/state_to_state_migrations_table_2019.xls")?,
            Url::parse("http://127.0.0.1:1/state_to_state_migrations_table_2018.xls")?,
        ];

        let report = download_all(&Client::new(), links.clone(), dir.path(), 1).await;
        assert!(report.saved.is_empty());
        let failed: Vec<&Url> = report.failed.iter().map(|(u, _)| u).collect();
        assert_eq!(failed.len(), 2);
        assert!(links.iter().all(|l| failed.contains(&l)));
        Ok(())
    }

    #[test]
    fn batch_isolates_bad_files() -> Result<()> {
        init_test_logging();
        let raw = tempdir()?;
        let out = tempdir()?;

        let good = raw.path().join("migrations_table_2019.xlsx");
        write_raw(
            &good,
            &census_rows(vec![
                vec!["Alabama", "", "", "120", "15"],
                vec![],
                vec!["Alaska", "80", "10", "", ""],
            ]),
        )?;

        let bad = raw.path().join("migrations_table_2020.xlsx");
        write_raw(&bad, &[vec!["nothing to see"]])?;

        let summary = process_files(
            &[bad.clone(), good.clone()],
            out.path(),
            &MigrationOptions::default(),
        );

        assert_eq!(summary.written.len(), 1);
        assert_eq!(summary.written[0].records, 2);
        assert_eq!(
            summary.written[0].output,
            out.path().join("migrations_dataframe_2019.xlsx")
        );
        assert!(summary.written[0].output.exists());

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, bad);
        assert!(summary.failed[0].1.contains("schema error"));
        Ok(())
    }
}
