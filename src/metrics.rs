// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Prometheus metrics exporter.

use crate::events::StreamKind;
use anyhow::Result;
use axum::{
    Router,
    extract::State,
    http::{
        HeaderValue, StatusCode,
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;

/// Configuration for the Prometheus metrics server.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub allow_origin: Option<String>,
}

#[derive(Clone, Default)]
pub struct MetricsHandle {
    inner: Option<Arc<MetricsInner>>,
}

#[derive(Clone)]
struct MetricsInner {
    registry: Registry,
    dispatched_records: IntCounterVec,
    failed_fetches: IntCounterVec,
    backfilled_blocks: IntCounter,
    last_tick_block: IntGauge,
    allow_origin: Option<String>,
}

impl MetricsHandle {
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self { inner: None });
        }

        let registry = Registry::new_custom(Some("sancho".to_string()), None)?;

        let dispatched_records = IntCounterVec::new(
            Opts::new(
                "dispatched_records",
                "Records handed to the state store after deduplication, per stream.",
            ),
            &["stream"],
        )?;
        registry.register(Box::new(dispatched_records.clone()))?;

        let failed_fetches = IntCounterVec::new(
            Opts::new("failed_fetches", "Log fetches that failed, per stream."),
            &["stream"],
        )?;
        registry.register(Box::new(failed_fetches.clone()))?;

        let backfilled_blocks = IntCounter::new(
            "backfilled_blocks",
            "Blocks fetched because a dispatched record referenced them.",
        )?;
        registry.register(Box::new(backfilled_blocks.clone()))?;

        let last_tick_block = IntGauge::new("last_tick_block", "Latest block that triggered a tick.")?;
        registry.register(Box::new(last_tick_block.clone()))?;

        // Standard build info style metric: value is always 1.
        let build_info = IntGaugeVec::new(
            Opts::new("build_info", "Build information about the running binary."),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            inner: Some(Arc::new(MetricsInner {
                registry,
                dispatched_records,
                failed_fetches,
                backfilled_blocks,
                last_tick_block,
                allow_origin: config.allow_origin.clone(),
            })),
        })
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    #[inline]
    pub fn record_dispatched(&self, stream: StreamKind, count: usize) {
        if let Some(inner) = &self.inner {
            inner
                .dispatched_records
                .with_label_values(&[stream.to_string().as_str()])
                .inc_by(count as u64);
        }
    }

    #[inline]
    pub fn record_fetch_failure(&self, stream: StreamKind) {
        if let Some(inner) = &self.inner {
            inner
                .failed_fetches
                .with_label_values(&[stream.to_string().as_str()])
                .inc();
        }
    }

    #[inline]
    pub fn record_backfilled_blocks(&self, count: usize) {
        if let Some(inner) = &self.inner {
            inner.backfilled_blocks.inc_by(count as u64);
        }
    }

    #[inline]
    pub fn record_tick(&self, block: u64) {
        if let Some(inner) = &self.inner {
            inner.last_tick_block.set(block as i64);
        }
    }

    pub async fn serve(&self, config: MetricsConfig) -> Result<Option<JoinHandle<()>>> {
        let Some(inner) = self.inner.clone() else {
            return Ok(None);
        };

        let addr: SocketAddr = format!("{}:{}", config.address, config.port).parse()?;
        let state = MetricsState {
            registry: inner.registry.clone(),
            allow_origin: inner.allow_origin.clone(),
        };

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Metrics server listening on {}", listener.local_addr()?);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Metrics server error: {e}");
            }
        });

        Ok(Some(handle))
    }
}

#[derive(Clone)]
struct MetricsState {
    registry: Registry,
    allow_origin: Option<String>,
}

async fn metrics_handler(State(state): State<MetricsState>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }

    let mut response = ([(CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response();

    if let Some(origin) = state.allow_origin.as_deref() {
        let value = HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("*"));
        response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }

    response
}
