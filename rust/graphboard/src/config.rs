use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env,
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub default_location: String,
    pub bigquery: Option<BigQueryConfig>,
}

#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project: String,
    pub access_token: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_rows: u32,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    graphboard_listen_addr: Option<String>,
    #[serde(default)]
    graphboard_listen_host: Option<String>,
    #[serde(default)]
    graphboard_listen_port: Option<u16>,
    #[serde(default = "default_data_dir")]
    graphboard_data_dir: String,
    #[serde(default = "default_location")]
    graphboard_default_location: String,
    #[serde(default)]
    graphboard_bigquery_project: Option<String>,
    #[serde(default)]
    google_cloud_project: Option<String>,
    #[serde(default)]
    graphboard_bigquery_token: Option<String>,
    #[serde(default)]
    graphboard_bigquery_endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    graphboard_query_timeout_secs: u64,
    #[serde(default = "default_max_rows")]
    graphboard_max_rows: u32,
}

fn default_data_dir() -> String {
    "data/graphs".to_string()
}

fn default_location() -> String {
    "EU".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_rows() -> u32 {
    10_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse GRAPHBOARD_* environment variables")?;

        let listen_addr = resolve_addr(
            raw.graphboard_listen_addr,
            raw.graphboard_listen_host,
            raw.graphboard_listen_port,
        )?;

        let project = raw
            .graphboard_bigquery_project
            .or(raw.google_cloud_project)
            .and_then(non_empty);

        let bigquery = project.map(|project| BigQueryConfig {
            project,
            access_token: raw
                .graphboard_bigquery_token
                .or_else(|| env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok())
                .and_then(non_empty),
            endpoint: raw
                .graphboard_bigquery_endpoint
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_BIGQUERY_ENDPOINT.to_string()),
            timeout: Duration::from_secs(raw.graphboard_query_timeout_secs.max(1)),
            max_rows: raw.graphboard_max_rows.max(1),
        });

        let default_location =
            non_empty(raw.graphboard_default_location).unwrap_or_else(default_location);

        Ok(Self {
            listen_addr,
            data_dir: PathBuf::from(raw.graphboard_data_dir),
            default_location,
            bigquery,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid GRAPHBOARD_LISTEN_ADDR value")?
            .next()
            .context("GRAPHBOARD_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(3000);
    format!("{host}:{port}")
        .to_socket_addrs()
        .context("invalid graphboard listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
