//! pkgd - privileged package management daemon
//!
//! Listens on a Unix socket, answers queries directly and runs write
//! transactions in the background while clients attach to their progress.

mod cli;
mod error;
mod logging;
mod protocol;
mod server;
mod setup;
mod watchdog;

use crate::cli::Cli;
use crate::error::DaemonError;
use crate::server::Server;
use crate::setup::{bind_socket, Services};
use crate::watchdog::{Activity, Watchdog};
use clap::Parser;
use pkgd_config::Config;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("daemon error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), DaemonError> {
    // Configuration precedence: file (or defaults), environment, CLI flags
    let mut config = Config::load_or_default(cli.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli);
    config.validate()?;

    logging::init_tracing(&config.logging, cli.debug, cli.json_logs);

    if cli.check_config {
        println!("configuration ok");
        return Ok(());
    }

    info!("Starting pkgd v{}", env!("CARGO_PKG_VERSION"));
    let services = Services::build(&config).await?;
    let listener = bind_socket(&config.service.socket_path)?;

    let activity = Activity::new();
    let watchdog = Watchdog::new(
        config.service.idle_timeout_secs,
        config.service.locked_idle_timeout_secs,
    );
    if !watchdog.is_enabled() {
        info!("idle exit disabled");
    }

    let server = Server::new(
        Arc::clone(&services.dispatcher),
        Arc::clone(&activity),
        config.service.max_request_bytes,
    );
    let idle = watchdog.wait(Arc::clone(&activity), Arc::clone(&services.transactions));
    server.run(listener, shutdown_signal(idle)).await;

    if let Err(e) = std::fs::remove_file(&config.service.socket_path) {
        warn!(error = %e, "cannot remove socket file");
    }
    info!("pkgd stopped");
    Ok(())
}

/// CLI flags override everything else
fn apply_cli_config(config: &mut Config, cli: &Cli) {
    if let Some(socket) = &cli.socket {
        config.service.socket_path.clone_from(socket);
    }
    if let Some(catalog) = &cli.catalog {
        config.engine.catalog = Some(catalog.clone());
    }
    if let Some(secs) = cli.idle_timeout {
        config.service.idle_timeout_secs = secs;
    }
    if cli.json_logs {
        config.logging.json = true;
    }
}

/// Resolves on idle timeout, SIGINT or SIGTERM
async fn shutdown_signal(idle: impl std::future::Future<Output = ()>) {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = idle => info!("exiting after idle timeout"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "cannot listen for SIGINT");
            }
            info!("interrupted");
        }
        () = terminate => info!("terminated"),
    }
}
