//! `coordinator-server` binary entry point: loads configuration, wires
//! [`coordinator_server::state::AppState`], serves the HTTP surface, and
//! drains gracefully on SIGINT/SIGTERM (spec §6, §7).

use clap::Parser;
use coordinator_server::config::CoordinatorConfig;
use coordinator_server::state::AppState;
use coordinator_server::{build_router, crash};
use tracing_subscriber::EnvFilter;

/// MCP Coordination Core: registry, routing, and interaction-log HTTP surface.
#[derive(Debug, Parser)]
#[command(name = "coordinator-server", version)]
struct Cli {
    /// Print the resolved listen address and exit without serving.
    #[arg(long)]
    check_config: bool,
}

const EXIT_GENERIC_FAILURE: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match CoordinatorConfig::try_build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    init_logging(&config.log_level);

    if cli.check_config {
        println!("listen_addr = {}", config.listen_addr);
        return;
    }

    crash::check_at_startup(&config.store_path);

    let (state, background_tasks) = AppState::bootstrap(config.clone());
    let router = build_router(state.clone());

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.listen_addr, "failed to bind listen address");
            std::process::exit(EXIT_GENERIC_FAILURE);
        }
    };

    tracing::info!(addr = %config.listen_addr, "coordinator-server listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        tracing::error!(error = %e, "server loop exited with an error");
        std::process::exit(EXIT_GENERIC_FAILURE);
    }

    tracing::info!("shutdown signal received, draining");
    state.final_snapshot();
    for task in background_tasks {
        task.abort();
    }
}

fn init_logging(level: &str) {
    use std::io::IsTerminal;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if std::io::stdout().is_terminal() {
        builder.with_ansi(true).init();
    } else {
        builder.json().init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
