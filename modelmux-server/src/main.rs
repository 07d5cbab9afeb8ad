//! modelmux Server - Headless Gateway Daemon
//!
//! A pure Rust HTTP server that:
//! - Routes OpenAI-compatible chat completions across providers on /v1/*
//! - Exposes operator controls (health, suppression, rate limits) on /api/*
//!
//! Access via: http://localhost:8045

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod cli;
mod commands;
mod gateway_file;
mod router;
mod server_utils;
mod state;
#[cfg(test)]
mod test_helpers;

use cli::{Cli, Commands};
use gateway_file::GatewayFile;
use modelmux_types::GatewayConfig;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = GatewayConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command {
        None | Some(Commands::Serve) => serve(config, &cli.config).await,
        Some(Commands::CheckConfig { json }) => commands::check_config(&config, &cli.config, json),
        Some(Commands::Routes { model, text, user, hint }) => {
            let file = GatewayFile::load(&cli.config).map_err(|e| anyhow::anyhow!(e))?;
            let decision =
                commands::dry_run(config, &file, &model, &text, user.as_deref(), hint.as_deref())?;
            commands::print_routes(&decision);
            Ok(())
        },
    }
}

async fn serve(config: GatewayConfig, config_path: &std::path::Path) -> Result<()> {
    let port = config.port;
    info!("modelmux starting on port {}...", port);

    let file = GatewayFile::load(config_path).map_err(|e| anyhow::anyhow!(e))?;
    let listener = server_utils::create_listener(port, &config).await?;
    let state = AppState::from_gateway_file(config, file)?;

    info!("{} providers, {} users loaded", state.provider_names().len(), state.user_count());

    let app = router::build_router(state);

    info!("Proxy endpoints at http://localhost:{}/v1/", port);
    info!("Operator API at http://localhost:{}/api/", port);

    axum::serve(listener, app).with_graceful_shutdown(server_utils::shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}
