// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! REST API of the synchronizer.
//!
//! # Description
//!
//! Exposes the on-demand historical fetch by maker address, the management of the tracked wallets and a status
//! report. Every endpoint is a `POST` taking and returning JSON. Errors are returned as `{"error": "..."}`.

use crate::{
    BlockHeader, CancellationToken, RxCancellationToken, SyncEngine, SyncError,
    engine::{CatchUpState, ReconcileOutcome},
    events::StreamKind,
    state::{MemoryStore, StateView},
};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use axum::{Router, extract::State, http::StatusCode, response::Json, routing::post};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = match e {
            SyncError::InvalidFilterInput(_) | SyncError::UnsupportedHistoricalStream(_) => {
                StatusCode::BAD_REQUEST
            }
            SyncError::FetchFailure { .. } | SyncError::Decode { .. } => StatusCode::BAD_GATEWAY,
            SyncError::Dispatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e)
    }
}

/// Shared state of the handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: SyncEngine,
    pub store: Arc<MemoryStore>,
}

#[derive(Debug, Deserialize)]
pub struct FetchHistoryRequest {
    /// Stream name, e.g. `swapFills`.
    pub stream: String,
    /// Maker whose orders are fetched.
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct FetchHistoryResponse {
    pub outcome: ReconcileOutcome,
}

#[derive(Debug, Deserialize)]
pub struct TrackAddressRequest {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct TrackAddressResponse {
    pub address: Address,
    /// False when the wallet was already tracked.
    pub added: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub latest_block: Option<BlockHeader>,
    pub catch_up: CatchUpState,
    pub known_events: BTreeMap<StreamKind, usize>,
    pub known_blocks: usize,
    pub tracked_addresses: Vec<Address>,
}

fn parse_address(value: &str) -> Result<Address, ApiError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid address: {e}")))
}

// POST handler for fetch_history
async fn fetch_history_handler(
    State(state): State<ApiState>,
    Json(payload): Json<FetchHistoryRequest>,
) -> Result<Json<FetchHistoryResponse>, ApiError> {
    let stream = payload.stream.parse::<StreamKind>().map_err(|_| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Unknown stream: {}", payload.stream),
        )
    })?;
    let maker = parse_address(&payload.address)?;

    let outcome = state.engine.fetch_historical(stream, maker).await?;

    Ok(Json(FetchHistoryResponse { outcome }))
}

// POST handler for track_address
async fn track_address_handler(
    State(state): State<ApiState>,
    Json(payload): Json<TrackAddressRequest>,
) -> Result<Json<TrackAddressResponse>, ApiError> {
    let address = parse_address(&payload.address)?;
    let added = state.store.track_address(address);

    if added {
        info!("Now tracking the ERC-20 transfers of {address}");
    }

    Ok(Json(TrackAddressResponse { address, added }))
}

// POST handler for status
async fn status_handler(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        latest_block: state.store.latest_block(),
        catch_up: state.engine.catch_up_state(),
        known_events: state.store.event_counts(),
        known_blocks: state.store.block_count(),
        tracked_addresses: state.store.tracked_addresses(),
    })
}

/// Creates and returns the REST API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/fetch_history", post(fetch_history_handler))
        .route("/track_address", post(track_address_handler))
        .route("/status", post(status_handler))
        .with_state(state)
}

/// Binds the REST API server and serves it in a separate task until the cancellation token fires.
pub async fn start_api_server(
    server_address: &str,
    state: ApiState,
    cancellation_token: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .with_context(|| format!("Failed to bind the API server to {server_address}"))?;
    info!("REST API server listening on {}", listener.local_addr()?);

    let app = create_router(state);
    let shutdown = cancellation_token.subscribe();

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await
        {
            error!("API server error: {e}");
        }
    }))
}

async fn shutdown_signal(mut shutdown: RxCancellationToken) {
    let _ = shutdown.recv().await;
    info!("API server shutdown signal received");
}
