// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! One-time wide catch-up performed when the first block is observed.

use super::{ReconcileOutcome, SyncEngine};
use crate::{BlockHeader, BlockRange, error::SyncResult, events::StreamKind};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CatchUpState {
    NotStarted,
    Started,
}

/// Process-lifetime "run at most once" gate of the catch-up.
///
/// The transition `NotStarted -> Started` is a single compare-and-set, thus concurrent ticks can't both win it. It
/// is never reverted, not even when the catch-up fails.
#[derive(Debug, Default)]
pub struct CatchUpGuard {
    started: AtomicBool,
}

impl CatchUpGuard {
    /// Attempts the transition. Returns true only for the caller that performed it.
    pub fn try_start(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn state(&self) -> CatchUpState {
        if self.started.load(Ordering::Acquire) {
            CatchUpState::Started
        } else {
            CatchUpState::NotStarted
        }
    }
}

impl SyncEngine {
    /// Reconciles the catch-up streams over `[head - lookback, head]`.
    ///
    /// # Description
    ///
    /// Uses the same deduplication and dispatch path as the per-tick reconciliation, with the known sets read when
    /// the catch-up begins. Failures are logged and not retried.
    pub(super) async fn run_catch_up(
        &self,
        head: &BlockHeader,
    ) -> Vec<(StreamKind, SyncResult<ReconcileOutcome>)> {
        let range = BlockRange::lookback(head.number, self.settings.lookback_blocks);
        info!(
            "Starting the one-time catch-up over blocks [{}-{}]",
            range.from_block, range.to_block
        );

        let results = join_all(StreamKind::CATCH_UP.iter().map(|kind| async move {
            (*kind, self.reconcile(*kind, range).await)
        }))
        .await;

        for (kind, result) in &results {
            match result {
                Ok(outcome) => info!(
                    "Catch-up of {kind} done: {} fetched, {} new",
                    outcome.fetched, outcome.dispatched
                ),
                Err(e) => error!("Catch-up of {kind} failed, it won't be retried: {e}"),
            }
        }

        results
    }
}
