use std::sync::Arc;

use color_eyre::eyre;
use tokio::sync::watch;
use tracing::info;
use upgrader_engine::DockerEngine;
use upgrader_lib::{Reconciler, UpgraderConfig};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting container upgrader...");

    let config = UpgraderConfig::from_env()?;
    info!(endpoint = %config.docker_host, service = %config.service_name,
        "configuration loaded");

    let engine = Arc::new(DockerEngine::connect(&config.docker_host)?);
    let reconciler = Reconciler::new(engine, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut reconciler_handle = tokio::spawn(reconciler.run(shutdown_rx));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupt received, shutting down");
            // In-flight replace transitions run to completion first.
            shutdown_tx.send(true).ok();
            reconciler_handle.await??;
        }
        finished = &mut reconciler_handle => {
            finished??;
        }
    }

    info!("Container upgrader stopped.");
    Ok(())
}
