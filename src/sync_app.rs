// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

use crate::{
    BlockWatcher, CancellationToken, SyncEngine,
    api_rest::{ApiState, start_api_server},
    configuration::SyncConfiguration,
    constants,
    engine::CatchUpGuard,
    metrics::MetricsHandle,
    source::{EventSource, LogFetcher, RpcEventSource},
    state::MemoryStore,
};
use alloy::{
    providers::ProviderBuilder,
    rpc::client::RpcClient,
    transports::{http::reqwest::Url, layers::RetryBackoffLayer},
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tracing::{info, warn};

pub struct SyncApp {
    pub config: SyncConfiguration,
    pub source: Arc<dyn EventSource>,
    pub store: Arc<MemoryStore>,
    pub engine: SyncEngine,
    pub metrics: MetricsHandle,
    pub cancellation_token: CancellationToken,
}

impl SyncApp {
    /// Builds a new instance of the app connected to the configured RPC node.
    pub fn build_app(config: SyncConfiguration) -> Result<Self> {
        let url: Url = config
            .rpc_url
            .expose_secret()
            .parse()
            .context("Failed to parse the RPC URL")?;

        info!(
            "Connecting to the RPC node at {}",
            url.host_str().unwrap_or("<unknown host>")
        );

        // Only rate limited requests are retried, any other failure surfaces to the engine.
        let retry_layer = RetryBackoffLayer::new(
            constants::DEFAULT_BACKOFF_LAYER_MAX_RETRIES,
            constants::DEFAULT_BACKOFF_LAYER_BACKOFF_TIME,
            constants::DEFAULT_BACKOFF_LAYER_CUP_SIZE,
        );
        let provider =
            ProviderBuilder::new().connect_client(RpcClient::builder().layer(retry_layer).http(url));

        Self::with_source(config, Arc::new(RpcEventSource::new(Arc::new(provider))))
    }

    /// Builds the app on top of an arbitrary event source.
    pub fn with_source(config: SyncConfiguration, source: Arc<dyn EventSource>) -> Result<Self> {
        let store = Arc::new(MemoryStore::with_tracked_addresses(
            config.tracked_wallets.iter().copied(),
        ));
        let metrics = MetricsHandle::new(&config.metrics).context("Failed to set up the metrics")?;

        let engine = SyncEngine::new(
            LogFetcher::new(source.clone(), config.catalog),
            store.clone(),
            store.clone(),
            Arc::new(CatchUpGuard::default()),
            config.engine,
        )
        .with_metrics(metrics.clone());

        Ok(Self {
            config,
            source,
            store,
            engine,
            metrics,
            cancellation_token: CancellationToken::default(),
        })
    }

    /// Runs the app until Ctrl+C or until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let metrics_handle = self
            .metrics
            .serve(self.config.metrics.clone())
            .await
            .context("Failure in the metrics server")?;

        let api_handle = start_api_server(
            &self.config.api_server(),
            ApiState {
                engine: self.engine.clone(),
                store: self.store.clone(),
            },
            self.cancellation_token.clone(),
        )
        .await
        .context("Failure in the REST API server")?;

        info!(
            "Following {} tracked wallet(s), catch-up window of {} blocks",
            self.config.tracked_wallets.len(),
            self.config.engine.lookback_blocks
        );

        let watcher = BlockWatcher::new(
            self.source.clone(),
            self.engine.clone(),
            self.store.clone(),
            self.config.poll_interval,
            self.cancellation_token.clone(),
        );
        let watcher_handle = tokio::spawn(async move { watcher.run().await });

        let ctrl_c_task = SyncApp::spawn_ctrl_c_handler(self.cancellation_token.clone());

        // The watcher only returns once the shutdown was signalled.
        watcher_handle.await??;
        ctrl_c_task.abort();
        let _ = api_handle.await;
        if let Some(handle) = metrics_handle {
            handle.abort();
        }

        info!("Shutdown complete");

        Ok(())
    }

    fn spawn_ctrl_c_handler(cancellation_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            ctrl_c().await.ok();
            warn!("Received Ctrl+C, shutting down gracefully...");
            cancellation_token.graceful_shutdown();
        })
    }
}
