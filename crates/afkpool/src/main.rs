use std::path::PathBuf;

use afkpool::{AfkpoolConfig, AfkpoolServer, LogBuffer};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Keeps a pool of game accounts online behind an HTTP control surface.
#[derive(Debug, Parser)]
#[command(name = "afkpool", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control surface address, overriding the config file and PORT
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = AfkpoolConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    let logs = LogBuffer::new(config.log_capacity);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(logs.layer())
        .init();

    tracing::info!(
        bind = %config.bind,
        auth_dir = %config.auth_dir.display(),
        proxies = config.proxies.len(),
        "starting afkpool"
    );

    let server = AfkpoolServer::from_config(&config, logs).await?;
    server.run().await?;
    Ok(())
}
