use anyhow::Result;
use ethers::providers::{Provider, Ws};
use log::info;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;

use tokenpipe::{
    config::PipelineConfig,
    metadata::Erc20MetadataResolver,
    persistence::InMemoryTokenStore,
    supervisor::PipelineSupervisor,
    utils::setup_logger,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_logger()?;

    let config = PipelineConfig::from_env()?;
    config.validate()?;

    PrometheusBuilder::new().install()?;

    let ws = Ws::connect(&config.wss_url).await?;
    let provider = Arc::new(Provider::new(ws));

    let store = Arc::new(InMemoryTokenStore::new());
    let resolver = Arc::new(Erc20MetadataResolver::new(provider.clone()));

    let supervisor = PipelineSupervisor::new(config, provider, resolver, store)?;
    supervisor.initialize().await?;
    info!("token pipeline running");

    tokio::signal::ctrl_c().await?;
    info!("termination signal received");
    supervisor.shutdown().await;

    Ok(())
}
