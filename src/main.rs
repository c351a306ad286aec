//! Upload gate
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ listener ──▶ admission ──▶ headers ──▶ auth ──┬─▶ /files/*  ──▶ upload server
//!              (permits,     (token        (nosniff,   (token  │   (size cap)
//!               timeouts)     bucket)       CSP, ...)   check) └─▶ static dir
//!
//!     sweeper: idle visitors every 5 min, expired uploads every hour
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use upload_gate::config::{load_config, Secret};
use upload_gate::http::server::serve_with_sweepers;
use upload_gate::lifecycle::signals::spawn_signal_handler;
use upload_gate::lifecycle::startup::prepare_storage;
use upload_gate::net::Listener;
use upload_gate::observability::{logging::init_logging, metrics::init_metrics};
use upload_gate::{GateServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "upload-gate", version, about)]
struct Cli {
    /// Path to a TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("upload-gate: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "upload-gate starting");

    let secret = match Secret::from_env(&config.security.secret_env) {
        Ok(secret) => secret,
        Err(e) => {
            tracing::error!(error = %e, "Refusing to start without an upload secret");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = prepare_storage(&config.upload).await {
        tracing::error!(
            storage_dir = %config.upload.storage_dir.display(),
            error = %e,
            "Failed to prepare storage directory"
        );
        return ExitCode::FAILURE;
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        base_path = %config.upload.base_path,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    let listener = match Listener::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    let server = match GateServer::new(config, secret) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build server");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let _signals = spawn_signal_handler(shutdown.clone());

    match serve_with_sweepers(server, listener, &shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
