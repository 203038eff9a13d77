use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rcscaler::cli::Cli;
use rcscaler::config::load_scaler_config;
use rcscaler::scaling::{
    HttpClusterStateAuthority, HttpProvisioner, HttpRuleStorage, ScalerLoop, ScalerLoopConfig,
    TokioClock,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_scaler_config(&cli.config)?;
    let cluster_id = config.cluster_id();

    info!(cluster_id = %cluster_id, "starting resource cluster autoscaler");

    let http_client = reqwest::Client::new();
    let cluster_state = Arc::new(HttpClusterStateAuthority::new(
        http_client.clone(),
        config.cluster_state_url.clone(),
    ));
    let provisioner = Arc::new(HttpProvisioner::new(
        http_client.clone(),
        config.provisioner_url.clone(),
    ));
    let rule_storage = Arc::new(HttpRuleStorage::new(http_client, config.rule_storage_url.clone()));

    let loop_config = ScalerLoopConfig {
        cluster_id,
        scaler_pull_threshold: std::time::Duration::from_secs(config.scaler_pull_threshold_secs),
        rule_set_refresh_threshold: std::time::Duration::from_secs(
            config.rule_set_refresh_threshold_secs,
        ),
    };

    let scaler_loop = ScalerLoop::new(
        loop_config,
        cluster_state,
        provisioner,
        rule_storage,
        Arc::new(TokioClock),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scaler_loop.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    Ok(())
}
