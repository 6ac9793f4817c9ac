//! Query execution against BigQuery's `jobs.query` REST endpoint.

use crate::{
    chart::{Row, Scalar},
    config::{AppConfig, BigQueryConfig},
    error::{Result, ServiceError},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn run_query(&self, sql: &str, location: &str) -> Result<Vec<Row>>;
}

/// Picks the BigQuery client when a project is configured.
pub fn from_config(config: &AppConfig) -> anyhow::Result<Arc<dyn Warehouse>> {
    match &config.bigquery {
        Some(bigquery) => Ok(Arc::new(BigQueryClient::new(bigquery.clone())?)),
        None => {
            warn!("no BigQuery project configured; queries will be rejected");
            Ok(Arc::new(DisabledWarehouse))
        }
    }
}

pub struct DisabledWarehouse;

#[async_trait]
impl Warehouse for DisabledWarehouse {
    async fn run_query(&self, _sql: &str, _location: &str) -> Result<Vec<Row>> {
        Err(ServiceError::Config(
            "GRAPHBOARD_BIGQUERY_PROJECT is not set".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct BigQueryClient {
    client: Client,
    config: Arc<BigQueryConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryJob<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    location: &'a str,
    timeout_ms: u64,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryJobResponse {
    #[serde(default)]
    job_complete: Option<bool>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct TableField {
    name: String,
    #[serde(rename = "type", default)]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl BigQueryClient {
    pub fn new(config: BigQueryConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn queries_url(&self) -> String {
        format!(
            "{}/projects/{}/queries",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project
        )
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn run_query(&self, sql: &str, location: &str) -> Result<Vec<Row>> {
        let job = QueryJob {
            query: sql,
            use_legacy_sql: false,
            location,
            timeout_ms: self.config.timeout.as_millis() as u64,
            max_results: self.config.max_rows,
        };

        let mut request = self.client.post(self.queries_url()).json(&job);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ServiceError::Warehouse(format!("BigQuery request failed: {err}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ServiceError::Warehouse(format!("BigQuery response unreadable: {err}")))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("BigQuery returned status {status}"));
            return Err(ServiceError::Warehouse(message));
        }

        let rows = decode_response(&body)?;
        debug!(rows = rows.len(), %location, "BigQuery query completed");
        Ok(rows)
    }
}

/// Decodes a `jobs.query` response body into rows keyed by schema field name.
pub fn decode_response(body: &[u8]) -> Result<Vec<Row>> {
    let response: QueryJobResponse = serde_json::from_slice(body)
        .map_err(|err| ServiceError::Warehouse(format!("unexpected BigQuery response: {err}")))?;

    if response.job_complete == Some(false) {
        return Err(ServiceError::Warehouse(
            "BigQuery job did not complete before the timeout".to_string(),
        ));
    }

    let fields = response.schema.map(|schema| schema.fields).unwrap_or_default();

    Ok(response
        .rows
        .into_iter()
        .map(|row| {
            fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| (field.name.clone(), decode_cell(field, cell.v)))
                .collect::<Row>()
        })
        .collect())
}

fn decode_cell(field: &TableField, value: Value) -> Scalar {
    let nested = field.mode.as_deref() == Some("REPEATED")
        || matches!(field.field_type.as_str(), "RECORD" | "STRUCT" | "JSON");

    match value {
        Value::Null => Scalar::Null,
        Value::String(raw) if !nested => decode_text(&field.field_type, raw),
        other => Scalar::Text(other.to_string()),
    }
}

fn decode_text(field_type: &str, raw: String) -> Scalar {
    match field_type {
        "INTEGER" | "INT64" | "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => raw
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map_or(Scalar::Text(raw), Scalar::Number),
        "DATE" | "DATETIME" | "TIME" => Scalar::temporal(raw),
        "TIMESTAMP" => Scalar::temporal(timestamp_text(&raw).unwrap_or(raw)),
        _ => Scalar::Text(raw),
    }
}

// TIMESTAMP cells arrive as fractional epoch seconds, e.g. "1.7040672E9".
fn timestamp_text(raw: &str) -> Option<String> {
    let seconds = raw.parse::<f64>().ok().filter(|s| s.is_finite())?;
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_micros(micros).map(|ts| ts.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_rows_by_field_type() {
        let body = json!({
            "kind": "bigquery#queryResponse",
            "jobComplete": true,
            "schema": { "fields": [
                { "name": "order_date", "type": "DATE", "mode": "NULLABLE" },
                { "name": "num", "type": "INTEGER", "mode": "NULLABLE" },
                { "name": "branch", "type": "STRING", "mode": "NULLABLE" },
                { "name": "created", "type": "TIMESTAMP", "mode": "NULLABLE" },
                { "name": "tags", "type": "STRING", "mode": "REPEATED" },
                { "name": "active", "type": "BOOLEAN", "mode": "NULLABLE" }
            ]},
            "rows": [
                { "f": [
                    { "v": "2024-01-01" },
                    { "v": "12" },
                    { "v": "se" },
                    { "v": "1.7040672E9" },
                    { "v": [{ "v": "a" }] },
                    { "v": "true" }
                ]},
                { "f": [
                    { "v": null },
                    { "v": null },
                    { "v": "fi" },
                    { "v": null },
                    { "v": [] },
                    { "v": null }
                ]}
            ],
            "totalRows": "2"
        });

        let rows = decode_response(body.to_string().as_bytes()).expect("body should decode");
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        let columns: Vec<&String> = first.keys().collect();
        assert_eq!(
            columns,
            vec!["order_date", "num", "branch", "created", "tags", "active"]
        );
        assert_eq!(first["order_date"], Scalar::temporal("2024-01-01"));
        assert_eq!(first["num"], Scalar::Number(12.0));
        assert_eq!(first["branch"], Scalar::from("se"));
        assert_eq!(first["created"], Scalar::temporal("2024-01-01T00:00:00+00:00"));
        assert_eq!(first["tags"], Scalar::from(r#"[{"v":"a"}]"#));
        assert_eq!(first["active"], Scalar::from("true"));

        assert_eq!(rows[1]["order_date"], Scalar::Null);
        assert_eq!(rows[1]["num"], Scalar::Null);
    }

    #[test]
    fn empty_result_has_no_rows() {
        let body = json!({
            "jobComplete": true,
            "schema": { "fields": [{ "name": "n", "type": "INTEGER" }] },
            "totalRows": "0"
        });
        let rows = decode_response(body.to_string().as_bytes()).expect("body should decode");
        assert!(rows.is_empty());
    }

    #[test]
    fn incomplete_job_is_an_error() {
        let body = json!({ "jobComplete": false, "jobReference": { "jobId": "job_1" } });
        let err = decode_response(body.to_string().as_bytes()).expect_err("job is incomplete");
        assert!(matches!(err, ServiceError::Warehouse(_)));
    }

    #[test]
    fn unparsable_numbers_stay_text() {
        let field = TableField {
            name: "n".to_string(),
            field_type: "FLOAT".to_string(),
            mode: None,
        };
        assert_eq!(decode_cell(&field, json!("NaN")), Scalar::from("NaN"));
        assert_eq!(decode_cell(&field, json!("0.5")), Scalar::Number(0.5));
    }

    #[tokio::test]
    async fn disabled_warehouse_rejects_queries() {
        let err = DisabledWarehouse
            .run_query("select 1", "EU")
            .await
            .expect_err("no project configured");
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
