//! `apollo-sync`: keep Apollo namespaces in sync and log every update.

mod args;

use apollo_sync::{ApolloClient, ApolloConfig, ApolloHandler};
use args::Cli;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Logs every namespace it is handed.
#[derive(Debug)]
struct LogHandler;

impl ApolloHandler for LogHandler {
    fn handle_config_change(&self, namespace: &str, config: &ApolloConfig) {
        info!(target: "apollo::cli", namespace, release_key = %config.release_key, keys = config.configurations.len(), "Namespace updated");
    }

    fn load_config(&self, namespace: &str, config: &ApolloConfig) {
        info!(target: "apollo::cli", namespace, release_key = %config.release_key, keys = config.configurations.len(), "Namespace loaded");
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.apollo.app_config()?;

    let client = ApolloClient::new(config)?;
    client.add_handler(Arc::new(LogHandler));
    client.start_listening().await?;

    tokio::signal::ctrl_c().await?;
    info!(target: "apollo::cli", "Shutting down");
    client.stop_listening().await?;
    Ok(())
}
