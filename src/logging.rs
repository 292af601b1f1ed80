// src/logging.rs

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE: &str = "pipeline.log";

/// Console logging plus, when `log_dir` is set, a plain-text file log.
///
/// The returned guard flushes the file writer on drop, so keep it alive for the
/// whole run.
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,statescraper=info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);

            tracing_subscriber::registry()
                .with(env)
                .with(console)
                .with(file)
                .try_init()
                .context("installing tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env)
                .with(console)
                .try_init()
                .context("installing tracing subscriber")?;
            Ok(None)
        }
    }
}

/// Test-only subscriber that routes output through the test harness.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,statescraper=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
