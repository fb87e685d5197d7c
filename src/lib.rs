//! maintwatch -- predictive-maintenance inference for machine telemetry.
//!
//! This crate scores telemetry records for anomalies and failure risk with
//! models produced by an offline training pipeline, and watches live
//! traffic for drift away from the training distribution.

pub mod api;
pub mod config;
pub mod drift;
pub mod error;
pub mod features;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod scoring;
pub mod service;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::service::InferenceService;

/// Start the maintwatch daemon: load artifacts, serve the HTTP API and,
/// when asked, score JSON-lines telemetry from stdin.
pub async fn serve(config: ServiceConfig, consume_stdin: bool) -> Result<()> {
    // 1. Load artifacts (missing ones are logged, not fatal)
    let service = Arc::new(InferenceService::from_config(&config)?);
    let cancel = CancellationToken::new();

    // 2. Optional stdin consumer behind the ingest queue
    let consumer = if consume_stdin {
        let (tx, handle) = ingest::spawn_queue_consumer(
            Arc::clone(&service),
            config.ingest.channel_capacity,
            cancel.clone(),
        );
        let stdin = ingest::JsonLinesSource::new(tokio::io::BufReader::new(tokio::io::stdin()));
        tokio::spawn(ingest::forward(stdin, tx, cancel.clone()));
        Some(handle)
    } else {
        None
    };

    // 3. Start API server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(api::state::AppState::new(Arc::clone(&service)));

    tracing::info!(%addr, variant = %service.variant(), "maintwatch listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
                _ = shutdown.cancelled() => {}
            }
        })
        .await
        .context("HTTP server failed")?;

    // 4. Drain the consumer between scoring calls, then report totals
    cancel.cancel();
    if let Some(handle) = consumer {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "telemetry consumer task failed");
        }
    }
    service.shutdown();

    Ok(())
}
