#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # shelly-update-server
//!
//! Update redirector for stock Shelly devices. Stock firmware polls
//! `/update`; the server maps the device to its HomeKit firmware model and
//! redirects the download there. Recent requests per client are viewable at
//! `/log` for troubleshooting.
//!
//! ## Subcommands
//!
//! - `shelly-update-server serve` (default) — run the HTTP server
//! - `shelly-update-server parse-log <file>` — replay an access log through
//!   the resolver and report how many requests would fail
//!
//! ## Architecture
//!
//! ```text
//! main.rs       — entry point, clap subcommands, graceful shutdown
//! config.rs     — TOML + env-var + flag configuration
//! models.rs     — StockModelMap, resolve()
//! history.rs    — ClientLogStore (per-client request history)
//! sweeper.rs    — periodic history pruning
//! replay.rs     — offline access-log replay
//! routes/
//!   update.rs   — /update redirects and browser page
//!   log.rs      — /log history page
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use shelly_update_server::config::{Config, Overrides};
use shelly_update_server::{replay, routes, sweeper, AppState, StockModelMap};

/// Firmware update redirector for stock Shelly devices.
#[derive(Parser)]
#[command(name = "shelly-update-server", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve(ServeArgs),
    /// Replay an access log through the resolver instead of serving.
    ParseLog {
        /// Access log to replay.
        file: String,
        /// Stock device ID prefix -> HomeKit model map (YAML or JSON).
        #[arg(long)]
        stock_model_map: Option<String>,
    },
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Stock device ID prefix -> HomeKit model map (YAML or JSON).
    #[arg(long)]
    stock_model_map: Option<String>,
    /// Serve HTTP requests on this addr:port.
    #[arg(long)]
    listen_addr: Option<String>,
    /// Get the remote client's address from this HTTP header.
    #[arg(long)]
    real_ip_header: Option<String>,
    /// URL template for firmware redirects; %s is replaced with the model name.
    #[arg(long)]
    dest_url_template: Option<String>,
    /// How long to retain per-client request history, in seconds.
    #[arg(long)]
    log_retention_secs: Option<u64>,
}

impl From<ServeArgs> for Overrides {
    fn from(args: ServeArgs) -> Self {
        Self {
            listen: args.listen_addr,
            real_ip_header: args.real_ip_header,
            dest_url_template: args.dest_url_template,
            stock_model_map: args.stock_model_map,
            log_retention_secs: args.log_retention_secs,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (overrides, replay_file) = match cli.command {
        Some(Commands::Serve(args)) => (Overrides::from(args), None),
        None => (Overrides::default(), None),
        Some(Commands::ParseLog {
            file,
            stock_model_map,
        }) => (
            Overrides {
                stock_model_map,
                ..Overrides::default()
            },
            Some(file),
        ),
    };

    let loaded = Config::load(cli.config.as_deref()).map(|mut config| {
        config.apply_overrides(overrides);
        config
    });

    // Initialize tracing
    let log_level = loaded
        .as_ref()
        .map_or_else(|_| "info".to_string(), |c| c.logging.level.clone());
    let log_filter = std::env::var("RUST_LOG").unwrap_or(log_level);
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("shelly-update-server v{} starting", env!("CARGO_PKG_VERSION"));

    let result = match loaded {
        Ok(config) => match replay_file {
            Some(file) => run_replay(&config, &file),
            None => run_server(config).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_models(config: &Config) -> Result<StockModelMap, String> {
    config.validate_models()?;
    let path = config.stock_model_map_path();
    info!("Using stock model map from {}", path.display());
    let models = StockModelMap::load(&path).map_err(|e| e.to_string())?;
    info!("Loaded {} stock model prefixes", models.len());
    Ok(models)
}

fn run_replay(config: &Config, file: &str) -> Result<(), String> {
    let models = load_models(config)?;
    replay::replay_file(&models, Path::new(file))
        .map(|_| ())
        .map_err(|e| format!("Failed to replay {file}: {e}"))
}

async fn run_server(config: Config) -> Result<(), String> {
    let redirect = config.validate_serve()?;
    let models = load_models(&config)?;
    info!("Will redirect to {}", redirect.as_str());

    let retention = config.log_retention();
    let grace = config.shutdown_grace();
    let listen = config.server.listen.clone();
    let state = AppState::new(config, models, redirect);

    let listener = TcpListener::bind(&listen)
        .await
        .map_err(|e| format!("Failed to bind {listen}: {e}"))?;
    info!("Listening on {listen}");

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();

    let app = routes::router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
    let server_shutdown = shutdown.clone();
    let mut server_task = tracker.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
    });
    sweeper::spawn(&tracker, state.history.clone(), retention, shutdown.clone());
    tracker.close();

    tokio::select! {
        () = shutdown_signal() => {}
        result = &mut server_task => {
            shutdown.cancel();
            return match result {
                Ok(Ok(())) => Err("Server stopped unexpectedly".to_string()),
                Ok(Err(e)) => Err(format!("Server error: {e}")),
                Err(e) => Err(format!("Server task failed: {e}")),
            };
        }
    }

    // Graceful shutdown: stop accepting, let in-flight requests and the
    // sweeper finish within the grace period.
    shutdown.cancel();
    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        warn!(
            "Tasks did not stop within {}s, closing anyway",
            grace.as_secs()
        );
    }
    info!("Exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Got SIGINT, stopping"),
                    _ = sigterm.recv() => info!("Got SIGTERM, stopping"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                info!("Got SIGINT, stopping");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Got SIGINT, stopping");
    }
}
