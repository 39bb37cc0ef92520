use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod api;
mod config;
mod db;
mod error;
mod predictor;
mod providers;
mod seed;

use api::AppState;
use config::Config;
use db::Database;
use predictor::{BatchMode, BatchRunner, CancelToken, PredictionEngine};
use providers::PredictionSink;
use seed::SeedData;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    if let Some(path) = &config.seed_path {
        let data = SeedData::load(path)?;
        seed::seed_if_empty(&db, &data)?;
    } else if db.count_clubs()? == 0 {
        warn!("Database has no clubs and no SEED_PATH was given; predictions will stay empty");
    }

    let engine = Arc::new(PredictionEngine::new(config.engine_params()));
    let store = Arc::new(db.clone());
    let predictions: Arc<dyn PredictionSink> = store.clone();
    let runner = Arc::new(BatchRunner::new(
        engine,
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        config.batch_config(),
    ));

    let state = AppState {
        db: db.clone(),
        predictions,
        runner: runner.clone(),
    };
    let app = api::router(state);
    let addr: SocketAddr = config.api_addr.parse()?;
    info!("Prediction API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Scheduled generation fills in fixtures lacking a current prediction
    let cancel = CancelToken::new();
    match config.generate_interval() {
        Some(every) => {
            let cancel = cancel.clone();
            tokio::spawn(async move { run_scheduler(runner, every, cancel).await });
        }
        None => info!("Scheduled prediction generation disabled"),
    }

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            shutdown_cancel.cancel();
        })
        .await?;

    Ok(())
}

async fn run_scheduler(runner: Arc<BatchRunner>, every: Duration, cancel: CancelToken) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if cancel.is_cancelled() {
            break;
        }
        match runner.generate_batch(BatchMode::Missing, &cancel).await {
            Ok(report) if !report.failed.is_empty() => warn!(
                "Scheduled batch left {} fixture(s) without a prediction",
                report.failed.len()
            ),
            Ok(_) => {}
            Err(e) => error!("Scheduled prediction batch aborted: {}", e),
        }
    }
}
