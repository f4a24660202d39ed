// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Druckwacht — SDCP 3D printer monitor
//
// Entry point. Initialises logging, loads the configuration, binds the
// discovery socket and runs the monitor until Ctrl-C.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use druckwacht_core::error::Result;
use druckwacht_monitor::{MonitorCoordinator, PrinterDiscovery, WebSocketConnector};

use services::audio::BellPlayer;
use services::console::ConsoleReporter;
use services::{data_dir, settings};

#[derive(Debug, Parser)]
#[command(name = "druckwacht")]
#[command(about = "Watch SDCP 3D printers on the local network and sound alerts", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: config.json in the data directory)
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Druckwacht starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "druckwacht stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(path) => settings::load_config(&path)?,
        None => settings::load_or_create(&data_dir::data_dir())?,
    };
    config.validate()?;

    let discovery = PrinterDiscovery::bind(&config).await?;
    let connector = Arc::new(WebSocketConnector::new(config.websocket_port));
    let reporter = Arc::new(ConsoleReporter::stdout());
    let player = Arc::new(BellPlayer::new(config.audio.clone()));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("interrupt received, shutting down");
                    shutdown.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C"),
            }
        }
    });

    MonitorCoordinator::new(config, connector, reporter, player)
        .run(discovery.discover(), shutdown)
        .await;

    tracing::info!("Druckwacht stopped");
    Ok(())
}
