pub mod chart;
pub mod config;
pub mod error;
pub mod models;
pub mod params;
pub mod server;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod warehouse;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the graphboard service using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).await?.run().await
}
