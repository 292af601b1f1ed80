// src/storms/source.rs

use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{ArrayRef, StringBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::table_id;
use crate::config::StormsConfig;

const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";
const PAGE_SIZE: u32 = 50_000;
const WAIT_MS: u32 = 60_000;

/// Anything that can hand back one year's storm events.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn fetch_year(&self, year: i32) -> Result<Vec<RecordBatch>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub job_complete: bool,
    pub job_reference: Option<JobReference>,
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: Value,
}

/// Turn one page of BigQuery rows into a batch of nullable text columns.
/// Scalars keep their wire text; nested values are kept as JSON.
pub fn rows_to_batch(schema: &TableSchema, rows: &[TableRow]) -> Result<RecordBatch> {
    let fields: Vec<Field> = schema
        .fields
        .iter()
        .map(|f| Field::new(&f.name, DataType::Utf8, true))
        .collect();

    let mut builders: Vec<StringBuilder> = fields.iter().map(|_| StringBuilder::new()).collect();
    for (i, row) in rows.iter().enumerate() {
        if row.f.len() != builders.len() {
            bail!("row {} has {} cells, schema has {} fields", i, row.f.len(), builders.len());
        }
        for (cell, b) in row.f.iter().zip(builders.iter_mut()) {
            match &cell.v {
                Value::Null => b.append_null(),
                Value::String(s) => b.append_value(s),
                other => b.append_value(other.to_string()),
            }
        }
    }

    let columns: Vec<ArrayRef> = builders
        .into_iter()
        .map(|mut b| Arc::new(b.finish()) as ArrayRef)
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context("building result batch")
}

/// BigQuery over its REST API, authenticated with a caller-supplied OAuth
/// bearer token.
pub struct BigQueryRest {
    client: Client,
    project_id: String,
    access_token: String,
    dataset: String,
    base: String,
}

impl BigQueryRest {
    pub fn from_config(cfg: &StormsConfig, client: Client) -> Result<Self> {
        let project_id = cfg
            .project_id
            .clone()
            .ok_or_else(|| anyhow!("storms.project_id is not set (GOOGLE_CLOUD_PROJECT)"))?;
        let access_token = cfg
            .access_token
            .clone()
            .ok_or_else(|| anyhow!("storms.access_token is not set (BIGQUERY_ACCESS_TOKEN)"))?;
        Ok(Self {
            client,
            project_id,
            access_token,
            dataset: cfg.dataset.clone(),
            base: BIGQUERY_API.to_string(),
        })
    }

    pub fn query_for(&self, year: i32) -> String {
        format!("SELECT * FROM `{}.{}`", self.dataset, table_id(year))
    }

    async fn start_query(&self, sql: &str) -> Result<QueryResponse> {
        let url = format!("{}/projects/{}/queries", self.base, self.project_id);
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "maxResults": PAGE_SIZE,
            "timeoutMs": WAIT_MS,
        });
        self.client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?
            .error_for_status()?
            .json::<QueryResponse>()
            .await
            .context("decoding query response")
    }

    async fn query_results(&self, job: &JobReference, page_token: Option<&str>) -> Result<QueryResponse> {
        let url = format!("{}/projects/{}/queries/{}", self.base, job.project_id, job.job_id);
        let mut params: Vec<(&str, String)> = vec![
            ("maxResults", PAGE_SIZE.to_string()),
            ("timeoutMs", WAIT_MS.to_string()),
        ];
        if let Some(loc) = &job.location {
            params.push(("location", loc.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        self.client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()?
            .json::<QueryResponse>()
            .await
            .context("decoding query results")
    }
}

#[async_trait]
impl QuerySource for BigQueryRest {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_year(&self, year: i32) -> Result<Vec<RecordBatch>> {
        let sql = self.query_for(year);
        let mut resp = self.start_query(&sql).await?;
        let job = resp
            .job_reference
            .clone()
            .ok_or_else(|| anyhow!("query response without a job reference"))?;

        let mut schema: Option<TableSchema> = None;
        let mut batches = Vec::new();
        loop {
            if resp.job_complete {
                if schema.is_none() {
                    schema = resp.schema.take();
                }
                let s = schema.as_ref().ok_or_else(|| anyhow!("completed query without a schema"))?;
                let batch = rows_to_batch(s, &resp.rows)?;
                debug!(year, rows = batch.num_rows(), "fetched page");
                batches.push(batch);

                match resp.page_token.take() {
                    Some(token) => resp = self.query_results(&job, Some(&token)).await?,
                    None => break,
                }
            } else {
                debug!(year, job = %job.job_id, "waiting for query job");
                resp = self.query_results(&job, None).await?;
            }
        }
        Ok(batches)
    }
}
