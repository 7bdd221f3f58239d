//! LanVault sync host - keeps rotating vault snapshots for devices on the LAN.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lanvault_host::config::{DEFAULT_BODY_LIMIT, DEFAULT_PORT, DEFAULT_TOKEN};
use lanvault_host::HostConfig;

#[derive(Parser)]
#[command(name = "lanvault-sync-host")]
#[command(about = "LanVault sync host")]
#[command(version)]
struct Args {
    /// Port to listen on.
    #[arg(short, long, env = "SYNC_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Token devices must present in the Authorization header.
    #[arg(long, env = "SYNC_TOKEN", default_value = DEFAULT_TOKEN, hide_env_values = true, hide_default_value = true)]
    token: String,

    /// Directory for vault snapshots and the version counter.
    #[arg(long, env = "SYNC_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Do not advertise the host on the local network.
    #[arg(long)]
    no_advertise: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl From<Args> for HostConfig {
    fn from(args: Args) -> Self {
        HostConfig {
            bind: args.bind,
            port: args.port,
            token: args.token,
            data_dir: args.data_dir,
            advertise: !args.no_advertise,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let config = HostConfig::from(args);
    info!(?config, "Starting LanVault sync host");

    lanvault_host::serve(config)
        .await
        .context("Sync host failed")
}
