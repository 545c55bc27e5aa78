//! otad - A/B over-the-air update agent
//!
//! Polls the update server, installs scheduled updates into the inactive
//! partition and flags it for the next boot.

use anyhow::{Context, Result};
use clap::Parser;
use ota_common::UpdateState;
use otad::cli::{Cli, Commands};
use otad::orchestrator::UpdateOutcome;
use otad::{Daemon, Device, HttpUpdateClient, PartitionDevice, UBootEnv};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.daemon_config();

    if cli.command() == Commands::Status {
        print_status(&cli, &config);
        return Ok(());
    }

    let device = Arc::new(
        PartitionDevice::new(UBootEnv::new(), &config.rootfs_part_a, &config.rootfs_part_b)
            .context("Invalid rootfs partition configuration")?,
    );

    match cli.command() {
        Commands::Commit => {
            device.commit_update().await.context("Commit failed")?;
            println!("Update committed");
            return Ok(());
        }
        Commands::Reboot => {
            device.reboot().await.context("Reboot failed")?;
            return Ok(());
        }
        _ => {}
    }

    let client = Arc::new(
        HttpUpdateClient::new(&cli.client_config()).context("Failed to set up update client")?,
    );
    let daemon = Arc::new(Daemon::new(client, device, config).with_state_path(&cli.state));

    if cli.command() == Commands::Check {
        let result = daemon.poll_once().await;
        let (updated, err) = UpdateOutcome::into_parts(result);
        match err {
            Some(e) => {
                error!(updated, "Update cycle failed: {}", e);
                std::process::exit(1);
            }
            None if updated => println!("Update installed, reboot to activate"),
            None => println!("No update available"),
        }
        return Ok(());
    }

    info!("otad v{} starting", env!("CARGO_PKG_VERSION"));
    let handle = Arc::clone(&daemon).spawn();

    wait_for_shutdown().await?;
    info!("Shutting down gracefully");

    handle.stop().await.context("Poll loop did not stop cleanly")?;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

fn print_status(cli: &Cli, config: &ota_common::DaemonConfig) {
    let state = UpdateState::load(&cli.state);

    println!("Server:        {}", config.server);
    println!("Device ID:     {}", config.device_id);
    println!("Poll interval: {}s", config.poll_interval.as_secs());
    println!("Rootfs A/B:    {} / {}", config.rootfs_part_a, config.rootfs_part_b);
    println!("Last check:    {}", state.format_last_check());
    println!("Last result:   {}", state.format_result());
    println!("Cycles:        {}", state.cycles);
}
