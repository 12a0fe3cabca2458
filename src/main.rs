use std::fmt::Display;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;

use openmodel::config::Config;
use openmodel::gateway_util::AppStateData;
use openmodel::observability;
use openmodel::probe;
use openmodel::routes::build_router;
use openmodel::server;

#[derive(Parser)]
#[command(name = "openmodel", version, about = "LLM gateway with per-target failover")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the OpenModel server (default)
    Serve,
    /// Test configured models
    Test {
        /// Model name to test (tests all if omitted)
        #[arg(long)]
        model: Option<String>,
        /// Output results in JSON format
        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        // Help and version requests print and exit 0; real usage errors exit 1
        if e.use_stderr() {
            e.print().ok();
            std::process::exit(1);
        }
        e.print().ok();
        std::process::exit(0);
    });

    let config = Arc::new(Config::load().expect_pretty("Failed to load config"));
    observability::setup_logs(&config.log_level, &config.log_format)
        .expect_pretty("Failed to initialize logging");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Test { model, check } => test(config, model.as_deref(), check).await,
    }
}

async fn serve(config: Arc<Config>) {
    let state = AppStateData::new(Arc::clone(&config)).expect_pretty("Failed to initialize AppState");
    let router = build_router(state);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .expect_pretty(&format!("Failed to bind to address `{bind_address}`"));

    tracing::info!(host = %config.server.host, port = config.server.port, "Starting openmodel");
    server::serve(listener, router, shutdown_signal()).await;
}

async fn test(config: Arc<Config>, model: Option<&str>, check: bool) {
    let state = AppStateData::new(config).expect_pretty("Failed to initialize AppState");

    match model {
        Some(model) => tracing::info!(model = %model, "Testing model"),
        None => tracing::info!("Testing all configured models"),
    }

    let summary = probe::run(&state, model).await;

    if check {
        probe::print_json(&summary).expect_pretty("Failed to render test summary");
    } else {
        probe::print_text(&summary);
    }

    tracing::info!(
        total = summary.total_tests,
        passed = summary.passed,
        failed = summary.failed,
        "Test completed"
    );

    if summary.failed > 0 {
        std::process::exit(1);
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect_pretty("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect_pretty("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        }
    };
}

/// ┌──────────────────────────────────────────────────────────────────────────┐
/// │                           MAIN.RS ESCAPE HATCH                           │
/// └──────────────────────────────────────────────────────────────────────────┘

/// We don't allow panic, escape, unwrap, or similar methods in the codebase,
/// except for the private `expect_pretty` method, which is to be used only in
/// main.rs during initialization. After initialization, we expect all code to
/// handle errors gracefully.
///
/// We use `expect_pretty` for better DX when handling errors in main.rs.
/// `expect_pretty` will print an error message and exit with a status code of 1.
trait ExpectPretty<T> {
    fn expect_pretty(self, msg: &str) -> T;
}

impl<T, E: Display> ExpectPretty<T> for Result<T, E> {
    fn expect_pretty(self, msg: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("{msg}: {err}");
                eprintln!("{msg}: {err}");
                std::process::exit(1);
            }
        }
    }
}
