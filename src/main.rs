// dcm - custom-domain certificate lifecycle manager
// Daemon entry point and CLI dispatch

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use domain_cert_manager::api::{self, ApiState};
use domain_cert_manager::config::ManagerConfig;
use domain_cert_manager::observability::{self, LogFormat};
use domain_cert_manager::scheduler::SweepTicker;
use domain_cert_manager::{bootstrap, signals};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        cli::Commands::Start { config } => {
            let format = if cli.verbose { LogFormat::Pretty } else { LogFormat::Json };
            observability::init(format)?;

            run_daemon(config).await
        }
        command => {
            if cli.verbose {
                observability::init(LogFormat::Pretty)?;
            }

            let result = cli::commands::execute(command).await;
            if let Err(e) = &result {
                cli::error(&format!("{:#}", e));
            }
            result
        }
    }
}

/// Run the daemon until SIGTERM / SIGINT
async fn run_daemon(config_path: String) -> Result<()> {
    info!("Starting custom-domain certificate manager");

    info!("Loading configuration from {}", config_path);
    let config = ManagerConfig::load(&config_path)?;
    info!("✓ Configuration loaded and validated");

    let executor = bootstrap::build_executor(&config)?;
    info!("✓ Update executor initialized");

    let shutdown_signal = signals::create_shutdown_listener()?;
    let coordinator = signals::ShutdownCoordinator::new();
    info!("✓ Signal handlers installed (SIGTERM, SIGINT)");

    let ticker = if config.scheduler.enabled {
        let ticker = SweepTicker::new(
            executor.clone(),
            Duration::from_secs(config.scheduler.interval_minutes * 60),
        );
        ticker.start(coordinator.subscribe());
        info!(
            interval_minutes = config.scheduler.interval_minutes,
            "✓ Sweep ticker started"
        );
        Some(ticker)
    } else {
        info!("Sweep ticker disabled");
        None
    };

    let api_handle = if config.api.enabled {
        let token = config
            .api
            .server_token
            .clone()
            .context("api.server_token is required when the API is enabled")?;
        let state = Arc::new(ApiState {
            executor: executor.clone(),
            server_token: token,
        });
        let bind_addr = config.api.bind_addr.clone();
        let port = config.api.port;
        let shutdown = coordinator.wait();

        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(&bind_addr, port, state, shutdown).await {
                error!("Operator API error: {:#}", e);
            }
        }))
    } else {
        info!("Operator API disabled");
        None
    };

    println!();
    cli::success("Certificate manager is running");
    if config.api.enabled {
        cli::info(&format!(
            "Operator API: {}",
            format!("http://{}:{}/api/v1/ssl", config.api.bind_addr, config.api.port)
                .cyan()
                .underline()
        ));
    }
    cli::info("Press Ctrl+C for graceful shutdown");
    println!();

    shutdown_signal.await;
    info!("Shutdown signal received - stopping");

    if let Some(ticker) = &ticker {
        ticker.stop();
    }
    coordinator.trigger();

    if let Some(handle) = api_handle {
        if tokio::time::timeout(Duration::from_secs(10), handle).await.is_err() {
            error!("Operator API did not stop within 10s");
        }
    }

    info!("✓ Graceful shutdown complete");
    Ok(())
}
