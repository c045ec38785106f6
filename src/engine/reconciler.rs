// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Fetch, deduplicate and dispatch cycle of a single stream.

use super::{ReconcileOutcome, SyncEngine, dedup::dedup};
use crate::{
    BlockRange,
    error::SyncResult,
    events::{EventRecord, StreamKind},
    topics::erc20_transfer_topics,
};
use alloy::primitives::B256;
use futures::future::try_join;
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl SyncEngine {
    /// Runs one reconciliation cycle of an on-chain event stream over `range`.
    ///
    /// # Description
    ///
    /// The known identifiers of the stream are read before the fetch is issued, never after it resolves. A batch
    /// dispatched meanwhile by another reconciliation doesn't change the outcome of this one. Zero or one batch is
    /// dispatched; nothing at all when the fetch or the deduplication leaves no records.
    pub async fn reconcile(&self, kind: StreamKind, range: BlockRange) -> SyncResult<ReconcileOutcome> {
        if kind == StreamKind::Erc20Transfers {
            return self.reconcile_erc20(range).await;
        }

        let known = self.state.known_identifiers(kind);
        let records = self
            .fetcher
            .fetch_range(kind, range)
            .await
            .inspect_err(|_| self.metrics.record_fetch_failure(kind))?;

        self.dispatch_unseen(kind, records, &known).await
    }

    /// Reconciles the ERC-20 transfers from and to the tracked wallets over `range`.
    ///
    /// # Description
    ///
    /// An empty tracked set performs no fetch at all. Both directions are fetched concurrently and the joined
    /// result (outgoing first) is dispatched whenever it is not empty. The known set is not consulted here, the
    /// store merges repeated transfers on its own.
    pub async fn reconcile_erc20(&self, range: BlockRange) -> SyncResult<ReconcileOutcome> {
        let kind = StreamKind::Erc20Transfers;
        let addresses = self.state.tracked_addresses();
        if addresses.is_empty() {
            debug!("No tracked wallets, skipping the ERC-20 transfers");
            return Ok(ReconcileOutcome::empty(kind));
        }

        let (from_topics, to_topics) = erc20_transfer_topics(&addresses)?;
        let to_block = Some(range.to_block);
        let (outgoing, incoming) = try_join(
            self.fetcher.fetch(kind, from_topics, range.from_block, to_block),
            self.fetcher.fetch(kind, to_topics, range.from_block, to_block),
        )
        .await
        .inspect_err(|_| self.metrics.record_fetch_failure(kind))?;

        let records = outgoing.into_iter().chain(incoming).collect::<Vec<_>>();
        if records.is_empty() {
            return Ok(ReconcileOutcome::empty(kind));
        }

        let fetched = records.len();
        self.dispatch_and_backfill(kind, records, fetched).await
    }

    /// Dispatches the records of a fetch that are not in `known`.
    pub(super) async fn dispatch_unseen(
        &self,
        kind: StreamKind,
        records: Vec<EventRecord>,
        known: &HashSet<B256>,
    ) -> SyncResult<ReconcileOutcome> {
        let fetched = records.len();
        let unseen = dedup(records, known);

        if unseen.is_empty() {
            if fetched > 0 {
                debug!("All {fetched} fetched {kind} records are already known");
            }
            return Ok(ReconcileOutcome {
                fetched,
                ..ReconcileOutcome::empty(kind)
            });
        }

        self.dispatch_and_backfill(kind, unseen, fetched).await
    }

    async fn dispatch_and_backfill(
        &self,
        kind: StreamKind,
        records: Vec<EventRecord>,
        fetched: usize,
    ) -> SyncResult<ReconcileOutcome> {
        let dispatched = records.len();
        self.sink.dispatch_batch(kind, records.clone()).await?;
        self.metrics.record_dispatched(kind, dispatched);
        info!("Dispatched {dispatched} new {kind} records");

        // A failed backfill doesn't undo the dispatch.
        let blocks_backfilled = match self.backfill(&records).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Backfill of the blocks referenced by {kind} failed: {e}");
                0
            }
        };

        Ok(ReconcileOutcome {
            stream: kind,
            fetched,
            dispatched,
            blocks_backfilled,
        })
    }
}
