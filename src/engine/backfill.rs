// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Backfill of the blocks referenced by dispatched records.

use super::SyncEngine;
use crate::{error::SyncResult, events::EventRecord};
use futures::future::try_join_all;
use std::collections::BTreeSet;
use tracing::debug;

/// Block numbers referenced by `batch` that are missing from `known`.
pub fn missing_blocks<F>(batch: &[EventRecord], is_known: F) -> BTreeSet<u64>
where
    F: Fn(u64) -> bool,
{
    batch
        .iter()
        .map(|record| record.block_number)
        .filter(|number| !is_known(*number))
        .collect()
}

impl SyncEngine {
    /// Fetches and dispatches the blocks referenced by a just dispatched batch that are not known yet.
    ///
    /// # Description
    ///
    /// The known blocks are read once, when the backfill is triggered. Each missing block is fetched once per
    /// trigger, all of them concurrently, and the whole set is dispatched as a single batch once every fetch
    /// resolved. A failing fetch fails the whole trigger and nothing is dispatched.
    ///
    /// Concurrent triggers are not coordinated: two batches referencing the same unknown block fetch it twice, and
    /// the second dispatch overwrites the first.
    ///
    /// Returns the number of dispatched blocks.
    pub async fn backfill(&self, batch: &[EventRecord]) -> SyncResult<usize> {
        let known = self.state.known_block_numbers();
        let missing = missing_blocks(batch, |number| known.contains(&number));

        if missing.is_empty() {
            return Ok(0);
        }

        debug!("Backfilling blocks {missing:?}");

        let blocks = try_join_all(
            missing
                .iter()
                .map(|number| self.fetcher.fetch_block(*number)),
        )
        .await?;

        let count = blocks.len();
        self.sink.dispatch_blocks(blocks).await?;
        self.metrics.record_backfilled_blocks(count);

        Ok(count)
    }
}
