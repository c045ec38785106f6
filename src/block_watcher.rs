// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module for the chain head watcher that turns new blocks into engine ticks.

use crate::{
    BlockHeader, CancellationToken, SyncEngine, engine::TickReport, source::EventSource, state::MemoryStore,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::{
    task::JoinHandle,
    time::{Duration, sleep},
};
use tracing::{debug, info, warn};

/// Polls the chain head and notifies the engine of every new block.
///
/// # Description
///
/// Every block past the last one seen gets its own tick, also when the head moved by several blocks between two
/// polls. The ticks of a poll run in order in their own task, thus a slow tick never delays the detection of the
/// next block. Polling errors are logged and the loop keeps going.
pub struct BlockWatcher {
    source: Arc<dyn EventSource>,
    engine: SyncEngine,
    store: Arc<MemoryStore>,
    poll_interval: Duration,
    cancellation_token: CancellationToken,
}

impl BlockWatcher {
    pub fn new(
        source: Arc<dyn EventSource>,
        engine: SyncEngine,
        store: Arc<MemoryStore>,
        poll_interval: u64,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            source,
            engine,
            store,
            poll_interval: Duration::from_secs(poll_interval),
            cancellation_token,
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!("Watching the chain head every {:?}", self.poll_interval);

        let mut shutdown = self.cancellation_token.subscribe();
        let mut last_seen = None;

        loop {
            self.poll_once(&mut last_seen).await;

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Block watcher stopped");
                    return Ok(());
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    /// Checks the chain head once. Returns the handle of the spawned ticks when the head advanced.
    ///
    /// # Description
    ///
    /// The first head observed is ticked alone, the catch-up covers what precedes it. Afterwards every block in
    /// `(last_seen, head]` is ticked. When the header of a skipped block can't be fetched, the ticks stop right
    /// before it and the next poll resumes from there.
    pub async fn poll_once(&self, last_seen: &mut Option<u64>) -> Option<JoinHandle<Vec<TickReport>>> {
        let head = match self.source.get_latest_block().await {
            Ok(head) => head,
            Err(e) => {
                warn!("Failed to get the latest block: {e}");
                return None;
            }
        };

        if last_seen.is_some_and(|seen| head.number <= seen) {
            debug!("No new block, head still at {}", head.number);
            return None;
        }

        let blocks = match *last_seen {
            Some(seen) if head.number > seen + 1 => self.skipped_blocks(seen + 1, head).await,
            _ => vec![head],
        };
        let newest = *blocks.last()?;

        *last_seen = Some(newest.number);
        self.store.set_latest_block(newest);

        let engine = self.engine.clone();
        Some(tokio::spawn(async move {
            let mut reports = Vec::with_capacity(blocks.len());
            for block in blocks {
                reports.push(engine.on_tick(block).await);
            }
            reports
        }))
    }

    /// Headers of `from..=head`, cut short at the first one that can't be fetched.
    async fn skipped_blocks(&self, from: u64, head: BlockHeader) -> Vec<BlockHeader> {
        debug!("Head jumped to {}, ticking blocks {from} onwards", head.number);

        let mut blocks = Vec::new();
        for number in from..head.number {
            match self.source.get_block(number).await {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    warn!("Failed to get block {number}, resuming from it on the next poll: {e}");
                    return blocks;
                }
            }
        }
        blocks.push(head);

        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{CatchUpGuard, EngineSettings},
        events::StreamKind,
        source::LogFetcher,
        state::StateView,
        test_utils::{MockEventSource, fake_address, fake_hash, stream_log, test_catalog},
    };
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn ticked(reports: &[TickReport]) -> Vec<u64> {
        reports.iter().map(|report| report.block_number).collect()
    }

    #[fixture]
    fn watcher() -> (BlockWatcher, Arc<MockEventSource>, Arc<MemoryStore>) {
        let source = Arc::new(MockEventSource::default());
        let store = Arc::new(MemoryStore::default());
        let engine = SyncEngine::new(
            LogFetcher::new(source.clone(), test_catalog()),
            store.clone(),
            store.clone(),
            Arc::new(CatchUpGuard::default()),
            EngineSettings::default(),
        );
        let watcher = BlockWatcher::new(
            source.clone(),
            engine,
            store.clone(),
            1,
            CancellationToken::default(),
        );

        (watcher, source, store)
    }

    #[rstest]
    #[tokio::test]
    async fn only_new_heads_trigger_a_tick(
        watcher: (BlockWatcher, Arc<MockEventSource>, Arc<MemoryStore>),
    ) {
        let (watcher, source, store) = watcher;
        let mut last_seen = None;

        source.set_latest(10);
        let first = watcher.poll_once(&mut last_seen).await.unwrap().await.unwrap();
        let repeated = watcher.poll_once(&mut last_seen).await;
        source.set_latest(11);
        let next = watcher.poll_once(&mut last_seen).await.unwrap().await.unwrap();

        assert_eq!(ticked(&first), vec![10]);
        assert!(repeated.is_none());
        assert_eq!(ticked(&next), vec![11]);
        assert_eq!(store.latest_block().map(|b| b.number), Some(11));
    }

    #[rstest]
    #[tokio::test]
    async fn blocks_skipped_between_polls_are_ticked(
        watcher: (BlockWatcher, Arc<MockEventSource>, Arc<MemoryStore>),
    ) {
        let (watcher, source, store) = watcher;
        let mut last_seen = None;
        source.set_latest(10);
        watcher.poll_once(&mut last_seen).await.unwrap().await.unwrap();

        let cancel = fake_hash();
        source.push_log(stream_log(
            &test_catalog(),
            StreamKind::ExchangeCancels,
            fake_address(),
            cancel,
            11,
        ));
        source.set_latest(14);
        let reports = watcher.poll_once(&mut last_seen).await.unwrap().await.unwrap();

        assert_eq!(ticked(&reports), vec![11, 12, 13, 14]);
        assert_eq!(last_seen, Some(14));
        assert_eq!(
            store
                .events(StreamKind::ExchangeCancels)
                .iter()
                .map(|r| r.transaction_hash)
                .collect::<Vec<_>>(),
            vec![cancel]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn unavailable_skipped_block_is_retried_on_the_next_poll(
        watcher: (BlockWatcher, Arc<MockEventSource>, Arc<MemoryStore>),
    ) {
        let (watcher, source, store) = watcher;
        let mut last_seen = None;
        source.set_latest(10);
        watcher.poll_once(&mut last_seen).await.unwrap().await.unwrap();

        source.fail_block(12);
        source.set_latest(13);
        let partial = watcher.poll_once(&mut last_seen).await.unwrap().await.unwrap();
        source.heal_block(12);
        let resumed = watcher.poll_once(&mut last_seen).await.unwrap().await.unwrap();

        assert_eq!(ticked(&partial), vec![11]);
        assert_eq!(ticked(&resumed), vec![12, 13]);
        assert_eq!(store.latest_block().map(|b| b.number), Some(13));
    }

    #[rstest]
    #[tokio::test]
    async fn polling_errors_are_skipped(watcher: (BlockWatcher, Arc<MockEventSource>, Arc<MemoryStore>)) {
        let (watcher, _, store) = watcher;
        let mut last_seen = None;

        assert!(watcher.poll_once(&mut last_seen).await.is_none());
        assert_eq!(last_seen, None);
        assert!(store.latest_block().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn run_stops_on_shutdown(watcher: (BlockWatcher, Arc<MockEventSource>, Arc<MemoryStore>)) {
        let (watcher, _, _) = watcher;
        let token = watcher.cancellation_token.clone();
        let handle = tokio::spawn(async move { watcher.run().await });

        // Let the watcher subscribe before signalling.
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.graceful_shutdown();

        assert!(handle.await.unwrap().is_ok());
    }
}
