//! Surebet value-betting pipeline
//!
//! Scores race snapshots, settles selections against market results, and
//! recalibrates the scoring weights from what actually won.

mod adjuster;
mod calibration;
mod cli;
mod config;
mod error;
mod features;
mod insights;
mod performance;
mod pipeline;
mod routes;
mod scoring;
mod settlement;
mod store;
mod types;

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::routes::AppState;
use crate::store::RecordType;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "surebet_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run_server(host, port))
        }
        Commands::Score { snapshot, format } => cli::run_score(snapshot, format),
        Commands::Settle { results, format } => cli::run_settle(results, format),
        Commands::Calibrate {
            window_days,
            format,
        } => cli::run_calibrate(window_days, format),
        Commands::Adjust { report } => cli::run_adjust(report),
        Commands::Learn { window_days } => cli::run_learn(window_days),
        Commands::Insights {
            course,
            date,
            format,
        } => cli::run_insights(course, date, format),
        Commands::Report { from, to, format } => cli::run_report(from, to, format),
    }
}

/// Run the read-only API server.
async fn run_server(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load configuration")?;

    // Override with CLI args
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("Store path: {}", config.store.path);

    let store = cli::open_store(&config)?;
    tracing::info!(
        "Store holds {} selections",
        store.count(RecordType::Selection)?
    );
    let state = Arc::new(AppState::new(store));
    let app = routes::router(state);

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid host {}", config.server.host))?,
        config.server.port,
    );
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
