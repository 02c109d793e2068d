// ==============================================================================
// api.rs - Local Status API
// ==============================================================================
// Description: Health and result endpoints for the worker process
// Author: Matt Barham
// Created: 2025-11-17
// Modified: 2025-12-02
// Version: 1.0.0
// ==============================================================================
// Diagnostic surface only: aggregate counters and completed reports.
// Raw SNP payloads never appear here.
// ==============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::info;

use kinship_analyzer::models::AnalysisReport;

use crate::processor::ProcessorState;

/// Shared state for the status handlers
#[derive(Clone)]
pub struct ApiState {
    processor: Arc<ProcessorState>,
    contract_address: String,
    started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(processor: Arc<ProcessorState>, contract_address: impl Into<String>) -> Self {
        Self {
            processor,
            contract_address: contract_address.into(),
            started_at: Utc::now(),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/result/{id}", get(result))
        .with_state(state)
}

/// Serve the status API until the shutdown signal flips
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind status API address")?;
    info!(%addr, "status API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("Status API server failed")
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    let (polls, completed, failed, rejected) = state.processor.metrics.snapshot();
    Json(json!({
        "status": "healthy",
        "contract": state.contract_address,
        "in_flight": state.processor.in_flight_count().await,
        "polls": polls,
        "completed": completed,
        "failed": failed,
        "rejected": rejected,
        "started_at": state.started_at.to_rfc3339(),
    }))
}

async fn result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisReport>, StatusCode> {
    let id = parse_request_id(&id).ok_or(StatusCode::BAD_REQUEST)?;
    match state.processor.result(id).await {
        Some(report) => Ok(Json(report)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// Request ids arrive as decimal or 0x-hex strings
fn parse_request_id(raw: &str) -> Option<U256> {
    let trimmed = raw.trim();
    if let Some(hex_part) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        U256::from_str_radix(hex_part, 16).ok()
    } else {
        U256::from_dec_str(trimmed).ok()
    }
}
