//! Binary entry point: parse arguments, load configuration, bootstrap the
//! server and run its event loop until interrupted.
//!
//! Exit status: 0 on a clean shutdown, non-zero for fatal startup failures
//! (unreadable configuration, socket bind failure, initial object
//! construction failure). A database outage after startup is handled by the
//! synchronization tasks and never terminates the process.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use bacnetd::config::{DeviceIdentity, Settings};
use bacnetd::server::Server;

#[derive(Debug, Parser)]
#[command(version, about = "BACnet/IP device server backed by a relational database")]
struct Args {
    /// Path to the server settings file
    #[arg(short, long, default_value = "bacnetd.toml")]
    config: PathBuf,

    /// Override the device identity file named in the settings
    #[arg(long)]
    device_ini: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let device_ini = args.device_ini.as_ref().unwrap_or(&settings.device_ini);
    let identity = DeviceIdentity::load(device_ini)
        .with_context(|| format!("loading {}", device_ini.display()))?;

    info!(
        "starting device {} \"{}\" (refresh every {}s, persist every {}s)",
        identity.instance,
        identity.object_name,
        settings.refreshing_interval,
        settings.persistence_interval
    );

    let server = Server::bootstrap(&settings, identity)
        .await
        .context("bootstrap failed")?;

    server.run().await?;

    info!("clean shutdown");
    Ok(())
}
