//! Passage segmentation pipeline
//!
//! Batch job that:
//! 1. Loads passages pending segmentation
//! 2. Splits each into token-bounded, natural-boundary segments via the
//!    Gemini copy operation, dispatched through the quota-aware key pool
//! 3. Persists each passage's segments as one atomic batch
//!
//! Failures cool down and retry the same passage; SIGINT/SIGTERM stops the
//! run at the next suspension point.

mod config;
mod driver;
mod engine;
mod error;
mod store;
mod tokens;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use copier::GeminiCopier;
use gemini_pool::KeyPool;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::driver::PipelineDriver;
use crate::engine::SegmentationEngine;
use crate::store::JsonSegmentStore;
use crate::tokens::TokenCounter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting segmenter");

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        daily_limit = config.pool.daily_limit,
        rpm_limit = config.pool.rpm_limit,
        max_tokens = config.engine.max_tokens,
        step_words = config.engine.step_words,
        model = %config.copier.model,
        "configuration loaded"
    );

    let keys = gemini_pool::load_keys(&config.pool.key_file)
        .with_context(|| format!("failed to load keys from {}", config.pool.key_file.display()))?;

    // Shutdown signal fans out to the pool's cooldown wait and the driver's
    // retry sleep through a watch channel.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let pool = Arc::new(KeyPool::new(
        keys,
        config.pool.daily_limit,
        config.pool.rpm_limit,
        Duration::from_secs(config.pool.cooldown_secs),
        shutdown_rx.clone(),
    ));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.copier.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let gemini = Arc::new(GeminiCopier::new(
        pool,
        http,
        config.copier.base_url.clone(),
        config.copier.model.clone(),
    ));

    let counter = Arc::new(TokenCounter::new(10_000).context("failed to load tokenizer")?);
    let engine = SegmentationEngine::new(
        gemini,
        counter,
        config.engine.max_tokens,
        config.engine.step_words,
    );

    let segment_store = Arc::new(
        JsonSegmentStore::load(config.pipeline.segments_file.clone())
            .await
            .context("failed to open segment store")?,
    );
    let passages = store::load_passages(&config.pipeline.passages_file)
        .await
        .context("failed to load passages")?;

    let pipeline = PipelineDriver::new(
        engine,
        segment_store,
        Duration::from_secs(config.pipeline.cooldown_secs),
        shutdown_rx,
    );

    match pipeline.run(&passages).await {
        Ok(summary) => {
            info!(
                passages = summary.passages,
                segments = summary.segments,
                "segmentation run complete"
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            info!("shutdown requested, exiting");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "segmentation run failed");
            Err(e.into())
        }
    }
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
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
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
