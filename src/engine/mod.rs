// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module for the synchronization engine.
//!
//! # Description
//!
//! The engine reacts to two triggers: a new block observed on chain ([SyncEngine::on_tick]) and an on-demand
//! request for the full history of a maker ([SyncEngine::fetch_historical]). Both share the same cycle: snapshot
//! the known identifiers of the stream, fetch, drop what is already known, dispatch what is left and backfill the
//! blocks the dispatched records point to.
//!
//! ## Concurrency
//!
//! All the streams of a tick are reconciled concurrently and complete in any order. Each one takes its own
//! snapshot when its fetch is issued, so a dispatch by one stream never changes the deduplication of another one
//! already in flight. A failing stream only fails its own reconciliation.

mod backfill;
mod catch_up;
mod dedup;
mod reconciler;

pub use backfill::missing_blocks;
pub use catch_up::{CatchUpGuard, CatchUpState};
pub use dedup::dedup;

use crate::{
    BlockHeader, BlockRange, constants,
    error::SyncResult,
    events::StreamKind,
    metrics::MetricsHandle,
    source::LogFetcher,
    state::{DispatchSink, StateView},
    topics::maker_topics,
};
use alloy::primitives::Address;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Window widths used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Blocks before the new head included in every tick.
    pub tick_window: u64,
    /// Blocks before the first head covered by the catch-up.
    pub lookback_blocks: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_window: constants::DEFAULT_TICK_WINDOW,
            lookback_blocks: constants::DEFAULT_LOOKBACK_BLOCKS,
        }
    }
}

/// What a reconciliation cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub stream: StreamKind,
    /// Records returned by the fetch.
    pub fetched: usize,
    /// Records handed to the dispatch sink.
    pub dispatched: usize,
    /// Blocks fetched and dispatched by the backfill.
    pub blocks_backfilled: usize,
}

impl ReconcileOutcome {
    pub fn empty(stream: StreamKind) -> Self {
        Self {
            stream,
            fetched: 0,
            dispatched: 0,
            blocks_backfilled: 0,
        }
    }
}

/// Results of the reconciliations run for a tick.
#[derive(Debug)]
pub struct TickReport {
    pub block_number: u64,
    pub results: Vec<(StreamKind, SyncResult<ReconcileOutcome>)>,
    /// Present only for the tick that started the catch-up.
    pub catch_up: Option<Vec<(StreamKind, SyncResult<ReconcileOutcome>)>>,
}

impl TickReport {
    /// Streams whose reconciliation failed during this tick.
    pub fn failed_streams(&self) -> Vec<StreamKind> {
        self.results
            .iter()
            .filter(|(_, result)| result.is_err())
            .map(|(kind, _)| *kind)
            .collect()
    }
}

/// Incremental event synchronization engine.
#[derive(Clone)]
pub struct SyncEngine {
    fetcher: LogFetcher,
    state: Arc<dyn StateView>,
    sink: Arc<dyn DispatchSink>,
    catch_up: Arc<CatchUpGuard>,
    settings: EngineSettings,
    metrics: MetricsHandle,
}

impl SyncEngine {
    pub fn new(
        fetcher: LogFetcher,
        state: Arc<dyn StateView>,
        sink: Arc<dyn DispatchSink>,
        catch_up: Arc<CatchUpGuard>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            fetcher,
            state,
            sink,
            catch_up,
            settings,
            metrics: MetricsHandle::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn catch_up_state(&self) -> CatchUpState {
        self.catch_up.state()
    }

    /// Handles a new block notification.
    ///
    /// # Description
    ///
    /// Reconciles the five on-chain event streams and the ERC-20 transfers of the tracked wallets over
    /// `[head - tick_window, head]`, all of them concurrently. Failures are logged and reported, never propagated.
    ///
    /// The first tick ever observed also wins the catch-up gate. The wide catch-up then runs once this tick's own
    /// reconciliations are dispatched, so both see each other's results in dispatch order. Any later tick, even a
    /// concurrent one, skips it.
    pub async fn on_tick(&self, block: BlockHeader) -> TickReport {
        let starts_catch_up = self.catch_up.try_start();
        let range = BlockRange::tick(block.number, self.settings.tick_window);
        self.metrics.record_tick(block.number);

        info!(
            "New block {}, reconciling blocks [{}-{}]",
            block.number, range.from_block, range.to_block
        );

        let streams = StreamKind::ON_CHAIN
            .into_iter()
            .chain([StreamKind::Erc20Transfers]);
        let results = join_all(
            streams.map(|kind| async move { (kind, self.reconcile(kind, range).await) }),
        )
        .await;

        for (kind, result) in &results {
            if let Err(e) = result {
                error!("Reconciliation of {kind} for block {} failed: {e}", block.number);
            }
        }

        let catch_up = if starts_catch_up {
            Some(self.run_catch_up(&block).await)
        } else {
            None
        };

        TickReport {
            block_number: block.number,
            results,
            catch_up,
        }
    }

    /// Fetches the whole history of a stream for the orders made by `maker`.
    ///
    /// # Description
    ///
    /// No block windowing: the fetch spans from the stream's first block up to the latest one. Deduplication and
    /// dispatch follow the same snapshot discipline as [SyncEngine::reconcile], so it may run alongside ticks.
    /// Only the on-chain event streams have a maker, ERC-20 transfers are rejected.
    pub async fn fetch_historical(&self, kind: StreamKind, maker: Address) -> SyncResult<ReconcileOutcome> {
        let topics = maker_topics(kind, maker)?;
        let known = self.state.known_identifiers(kind);
        let from_block = self.fetcher.catalog().history_start(kind);

        info!("Fetching the {kind} history of {maker} from block {from_block}");

        let records = self
            .fetcher
            .fetch(kind, topics, from_block, None)
            .await
            .inspect_err(|e| {
                self.metrics.record_fetch_failure(kind);
                warn!("Historical {kind} fetch for {maker} failed: {e}");
            })?;

        self.dispatch_unseen(kind, records, &known).await
    }
}
