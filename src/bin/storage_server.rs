//! Storage server binary.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use herdfs::config::StorageConfig;
use herdfs::storage::StorageServer;
use herdfs::Error;

/// Storage server of the herdfs distributed filesystem.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host directory to export.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Address advertised to the naming server and to clients.
    #[arg(long)]
    advertise_host: Option<IpAddr>,

    /// Host of the naming server's registration interface.
    #[arg(long)]
    naming_host: Option<IpAddr>,

    /// Port of the naming server's registration interface.
    #[arg(long)]
    naming_port: Option<u16>,
}

#[tokio::main]
async fn main() -> herdfs::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => StorageConfig::load(path)?,
        None => {
            let root = args
                .root
                .clone()
                .ok_or_else(|| Error::bad_argument("either --config or --root is required"))?;
            StorageConfig {
                root,
                advertise_host: IpAddr::from([127, 0, 0, 1]),
                naming_host: IpAddr::from([127, 0, 0, 1]),
                naming_port: herdfs::config::REGISTRATION_PORT,
            }
        }
    };
    if let Some(root) = args.root {
        config.root = root;
    }
    if let Some(host) = args.advertise_host {
        config.advertise_host = host;
    }
    if let Some(host) = args.naming_host {
        config.naming_host = host;
    }
    if let Some(port) = args.naming_port {
        config.naming_port = port;
    }

    let _server = StorageServer::start(
        config.root,
        config.advertise_host,
        SocketAddr::new(config.naming_host, config.naming_port),
    )
    .await?;

    tokio::signal::ctrl_c().await.map_err(Error::io)?;
    Ok(())
}
