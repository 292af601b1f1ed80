// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Run-wide settings. Built once in `main`, then handed to each pipeline by
/// reference.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub paths: Paths,
    pub migration: MigrationConfig,
    pub insurance: InsuranceConfig,
    pub storms: StormsConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Paths {
    /// Root that every relative folder below is resolved against.
    pub output_dir: PathBuf,
    pub census_raw_dir: PathBuf,
    pub census_cleaned_dir: PathBuf,
    pub insurance_dir: PathBuf,
    pub storms_dir: PathBuf,
    /// `None` disables the file log.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationConfig {
    pub source_url: String,
    /// Region whose column group marks the start of the per-region block.
    pub anchor_region: String,
    /// 0-based sheet row of the outer (region) header; the inner header follows it.
    pub header_row: usize,
    /// Regex matched against destination labels to exclude the national total.
    pub national_total_pattern: String,
    /// Raw files that are not single-year tables.
    pub skip_files: Vec<String>,
    pub download_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InsuranceConfig {
    pub source_url: String,
    /// Lower-cased text identifying the year-bearing section headings.
    pub heading_marker: String,
    pub output_file: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Parquet,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StormsConfig {
    pub project_id: Option<String>,
    pub access_token: Option<String>,
    pub dataset: String,
    pub first_year: i32,
    pub last_year: i32,
    pub concurrency: usize,
    pub format: ExportFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: Paths::default(),
            migration: MigrationConfig::default(),
            insurance: InsuranceConfig::default(),
            storms: StormsConfig::default(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            census_raw_dir: PathBuf::from("State to State Migration Flows - Raw Excel Data"),
            census_cleaned_dir: PathBuf::from("State to State Migration Flows - Cleaned Excel Data"),
            insurance_dir: PathBuf::from("Homeowners and Renters Insurance"),
            storms_dir: PathBuf::from("NOAA Historic Severe Storms"),
            log_dir: Some(PathBuf::from("Logs")),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_url: "https://www.census.gov/data/tables/time-series/demo/geographic-mobility/state-to-state-migration.html".into(),
            anchor_region: "Alabama".into(),
            header_row: 6,
            national_total_pattern: "United States".into(),
            skip_files: vec!["state_migration_flows_tables.xls".into()],
            download_concurrency: 3,
        }
    }
}

impl Default for InsuranceConfig {
    fn default() -> Self {
        Self {
            source_url: "https://www.iii.org/table-archive/21407".into(),
            heading_marker: "average premiums for homeowners and renters insurance".into(),
            output_file: "insurance_by_year_and_state.csv".into(),
        }
    }
}

impl Default for StormsConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            access_token: None,
            dataset: "bigquery-public-data.noaa_historic_severe_storms".into(),
            first_year: 1950,
            last_year: 2023,
            concurrency: 8,
            format: ExportFormat::Csv,
        }
    }
}

impl Config {
    /// Defaults, then the YAML file at `path` (if given), then environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                serde_yaml::from_str::<Config>(&text)
                    .with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Config::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(project) = env::var("GOOGLE_CLOUD_PROJECT") {
            self.storms.project_id = Some(project);
        }
        if let Ok(token) = env::var("BIGQUERY_ACCESS_TOKEN") {
            self.storms.access_token = Some(token);
        }
        if let Ok(dir) = env::var("STATESCRAPER_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(dir);
        }
    }

    /// Resolve a configured folder against `paths.output_dir`.
    pub fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.paths.output_dir.join(dir)
        }
    }

    pub fn storm_years(&self) -> Vec<i32> {
        (self.storms.first_year..=self.storms.last_year).collect()
    }
}
