use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use statescraper::{insurance, logging, migration, storms, Config};
use std::{path::PathBuf, time::Instant};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "statescraper", about = "Collect state-level migration, insurance and storm data")]
struct Cli {
    /// YAML config file; defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and normalize the census state-to-state migration tables
    Migration,
    /// Scrape and normalize the homeowners/renters premium tables
    Insurance,
    /// Export the yearly NOAA severe storm tables
    Storms {
        #[arg(long)]
        from: Option<i32>,
        #[arg(long)]
        to: Option<i32>,
    },
    /// Run every pipeline in turn
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    let log_dir = cfg.paths.log_dir.as_ref().map(|d| cfg.resolve(d));
    let _guard = logging::init(log_dir.as_deref())?;
    info!(command = ?cli.command, output_dir = %cfg.paths.output_dir.display(), "startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    let client = Client::builder().gzip(true).cookie_store(true).build()?;
    let start = Instant::now();

    match cli.command {
        Command::Migration => run_migration(&cfg, &client).await?,
        Command::Insurance => run_insurance(&cfg, &client).await?,
        Command::Storms { from, to } => {
            let years = year_range(&cfg, from, to)?;
            run_storms(&cfg, &client, &years).await?
        }
        Command::All => {
            let mut failures = 0;
            if let Err(e) = run_migration(&cfg, &client).await {
                error!(error = %format!("{:#}", e), "migration pipeline failed");
                failures += 1;
            }
            if let Err(e) = run_insurance(&cfg, &client).await {
                error!(error = %format!("{:#}", e), "insurance pipeline failed");
                failures += 1;
            }
            if let Err(e) = run_storms(&cfg, &client, &cfg.storm_years()).await {
                error!(error = %format!("{:#}", e), "storms pipeline failed");
                failures += 1;
            }
            if failures > 0 {
                bail!("{} of 3 pipelines failed", failures);
            }
        }
    }

    info!(elapsed = ?start.elapsed(), "done");
    Ok(())
}

fn year_range(cfg: &Config, from: Option<i32>, to: Option<i32>) -> Result<Vec<i32>> {
    let first = from.unwrap_or(cfg.storms.first_year);
    let last = to.unwrap_or(cfg.storms.last_year);
    if first > last {
        bail!("--from {} is after --to {}", first, last);
    }
    Ok((first..=last).collect())
}

async fn run_migration(cfg: &Config, client: &Client) -> Result<()> {
    let summary = migration::run(cfg, client).await?;
    for (url, reason) in &summary.download_failed {
        error!(%url, %reason, "not downloaded");
    }
    for (file, reason) in &summary.failed {
        error!(file = %file.display(), %reason, "not normalized");
    }
    if !summary.download_failed.is_empty() || !summary.failed.is_empty() {
        bail!(
            "{} downloads and {} spreadsheets failed",
            summary.download_failed.len(),
            summary.failed.len()
        );
    }
    Ok(())
}

async fn run_insurance(cfg: &Config, client: &Client) -> Result<()> {
    let (path, records) = insurance::run(cfg, client).await?;
    info!(records, file = %path.display(), "insurance written");
    Ok(())
}

async fn run_storms(cfg: &Config, client: &Client, years: &[i32]) -> Result<()> {
    let summary = storms::run(cfg, client, years).await?;
    for (year, reason) in &summary.failed {
        error!(year, %reason, "year not exported");
    }
    if !summary.failed.is_empty() {
        bail!("{} of {} years failed to export", summary.failed.len(), years.len());
    }
    Ok(())
}
