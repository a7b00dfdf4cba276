//! Naming server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use herdfs::config::NamingConfig;
use herdfs::naming::NamingServer;

/// Naming server of the herdfs distributed filesystem.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port of the client-facing service interface.
    #[arg(long)]
    service_port: Option<u16>,

    /// Port of the registration interface.
    #[arg(long)]
    registration_port: Option<u16>,

    /// Shared-access count at which files are replicated.
    #[arg(long)]
    replication_threshold: Option<u32>,
}

#[tokio::main]
async fn main() -> herdfs::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NamingConfig::load(path)?,
        None => NamingConfig::default(),
    };
    if let Some(port) = args.service_port {
        config.service_port = port;
    }
    if let Some(port) = args.registration_port {
        config.registration_port = port;
    }
    if let Some(threshold) = args.replication_threshold {
        config.replication_threshold = threshold;
    }

    let server = NamingServer::new(config.replication_threshold);
    server
        .start(
            SocketAddr::new(config.bind, config.service_port),
            SocketAddr::new(config.bind, config.registration_port),
        )
        .await?;

    tokio::signal::ctrl_c().await.map_err(herdfs::Error::io)?;
    Ok(())
}
