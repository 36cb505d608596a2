//! Search server with background alert scans.
//!
//! All tracing output goes to stderr.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use vigil::{SearchServer, VigilConfig};

/// Vigil: cached company search with scheduled alert scans.
#[derive(Debug, Parser)]
#[command(name = "vigil-server", version, about)]
struct Cli {
    /// Path to TOML configuration file (default: ~/.config/vigil/config.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.host`.
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port`.
    #[arg(short, long)]
    port: Option<u16>,
}

fn load_config(cli: &Cli) -> anyhow::Result<VigilConfig> {
    let mut config = match &cli.config {
        Some(path) => VigilConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let path = VigilConfig::default_config_path();
            if path.exists() {
                VigilConfig::from_file(&path)
                    .with_context(|| format!("loading config from {}", path.display()))?
            } else {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                VigilConfig::default()
            }
        }
    };
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    vigil::logging::init();
    tracing::info!("vigil-server starting");

    let config = load_config(&cli)?;
    let core = vigil::bootstrap(&config).context("bootstrapping refresh/lookup core")?;
    let server = SearchServer::start(core.clone(), &config.server).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");

    server.shutdown().await;
    core.shutdown().await;
    tracing::info!("vigil-server shut down cleanly");
    Ok(())
}
