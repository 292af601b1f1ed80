// src/storms/sink.rs

use anyhow::{bail, Context, Result};
use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use parquet::{
    arrow::ArrowWriter,
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::debug;

use super::table_id;
use crate::config::ExportFormat;

/// Where a year's result set ends up.
pub trait StormSink: Send + Sync {
    fn write_year(&self, year: i32, batches: &[RecordBatch]) -> Result<PathBuf>;
}

/// One file per year in a single directory, named after the source table.
pub struct FileSink {
    dir: PathBuf,
    format: ExportFormat,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, format: ExportFormat) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self { dir, format })
    }

    pub fn path_for(&self, year: i32) -> PathBuf {
        let ext = match self.format {
            ExportFormat::Csv => "csv",
            ExportFormat::Parquet => "parquet",
        };
        self.dir.join(format!("{}.{}", table_id(year), ext))
    }
}

impl StormSink for FileSink {
    fn write_year(&self, year: i32, batches: &[RecordBatch]) -> Result<PathBuf> {
        let final_path = self.path_for(year);
        let tmp_path = final_path.with_extension("tmp");

        let res = match self.format {
            ExportFormat::Csv => write_csv(&tmp_path, batches),
            ExportFormat::Parquet => write_parquet(&tmp_path, batches),
        };
        if let Err(e) = res {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("renaming {} to {}", tmp_path.display(), final_path.display()))?;
        debug!(year, file = %final_path.display(), "wrote year");
        Ok(final_path)
    }
}

fn write_csv(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    if batches.is_empty() {
        bail!("no result batches to write");
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    for batch in batches {
        writer.write(batch)?;
    }
    Ok(())
}

fn write_parquet(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    let Some(first) = batches.first() else {
        bail!("no result batches to write");
    };
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, first.schema(), Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(())
}
