// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module for the fetch boundary: the transport that serves logs and blocks, and the adapter that turns its raw
//! logs into event records.

use crate::{
    BlockHeader, BlockRange,
    error::{SyncError, SyncResult},
    events::{EventRecord, StreamCatalog, StreamKind},
    topics::TopicFilter,
};
use alloy::{
    eips::BlockNumberOrTag,
    primitives::Address,
    providers::Provider,
    rpc::types::{Filter, Log},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Arguments of a single `eth_getLogs` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Contract emitting the logs. `None` means no address filter.
    pub address: Option<Address>,
    pub topics: TopicFilter,
    pub from_block: u64,
    /// Last block of the query (inclusive). `None` means the latest block.
    pub to_block: Option<u64>,
}

impl From<&LogQuery> for Filter {
    fn from(query: &LogQuery) -> Self {
        let to_block = match query.to_block {
            Some(number) => BlockNumberOrTag::Number(number),
            None => BlockNumberOrTag::Latest,
        };

        let mut filter = Filter::new()
            .from_block(query.from_block)
            .to_block(to_block)
            .event_signature(query.topics.event_signature);

        if let Some(address) = query.address {
            filter = filter.address(address);
        }

        for (idx, values) in query.topics.indexed.iter().enumerate() {
            if !values.is_empty() {
                filter.topics[idx + 1] = values.clone().into();
            }
        }

        filter
    }
}

/// Opaque transport serving raw logs and blocks.
///
/// # Description
///
/// Implementations only move data and keep no cache on behalf of the engine. Transport failures are reported as
/// [SyncError::FetchFailure].
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches the logs matching the query, in the order served by the node.
    async fn get_logs(&self, query: &LogQuery) -> SyncResult<Vec<Log>>;
    /// Fetches the header of a block by number.
    async fn get_block(&self, number: u64) -> SyncResult<BlockHeader>;
    /// Fetches the header of the chain head.
    async fn get_latest_block(&self) -> SyncResult<BlockHeader>;
}

/// [EventSource] backed by an RPC node.
#[derive(Clone)]
pub struct RpcEventSource {
    provider: Arc<dyn Provider + Send + Sync>,
}

impl RpcEventSource {
    pub fn new(provider: Arc<dyn Provider + Send + Sync>) -> Self {
        Self { provider }
    }

    async fn block_by_number(&self, tag: BlockNumberOrTag) -> SyncResult<BlockHeader> {
        match self.provider.get_block_by_number(tag).await {
            Ok(Some(block)) => Ok(BlockHeader {
                number: block.header.number,
                hash: block.header.hash,
                timestamp: block.header.timestamp,
            }),
            Ok(None) => Err(SyncError::fetch(
                format!("block {tag:?}"),
                "block not served by the RPC node",
            )),
            Err(e) => Err(SyncError::fetch(format!("block {tag:?}"), e)),
        }
    }
}

#[async_trait]
impl EventSource for RpcEventSource {
    async fn get_logs(&self, query: &LogQuery) -> SyncResult<Vec<Log>> {
        let filter = Filter::from(query);

        self.provider.get_logs(&filter).await.map_err(|e| {
            SyncError::fetch(
                format!(
                    "logs {} [{}-{:?}]",
                    query.topics.event_signature, query.from_block, query.to_block
                ),
                e,
            )
        })
    }

    async fn get_block(&self, number: u64) -> SyncResult<BlockHeader> {
        self.block_by_number(BlockNumberOrTag::Number(number)).await
    }

    async fn get_latest_block(&self) -> SyncResult<BlockHeader> {
        self.block_by_number(BlockNumberOrTag::Latest).await
    }
}

/// Adapter over an [EventSource] that speaks in streams and event records.
#[derive(Clone)]
pub struct LogFetcher {
    source: Arc<dyn EventSource>,
    catalog: StreamCatalog,
}

impl LogFetcher {
    pub fn new(source: Arc<dyn EventSource>, catalog: StreamCatalog) -> Self {
        Self { source, catalog }
    }

    pub fn catalog(&self) -> &StreamCatalog {
        &self.catalog
    }

    /// Fetches the records of a stream matching `topics` within a block window.
    ///
    /// # Description
    ///
    /// The contract address is resolved from the stream (none for ERC-20 transfers). `to_block = None` reaches up
    /// to the latest block. The result keeps the order served by the node and is empty, never absent, when nothing
    /// matches. Logs that cannot be decoded are skipped with a warning.
    pub async fn fetch(
        &self,
        kind: StreamKind,
        topics: TopicFilter,
        from_block: u64,
        to_block: Option<u64>,
    ) -> SyncResult<Vec<EventRecord>> {
        let query = LogQuery {
            address: self.catalog.contract_address(kind),
            topics,
            from_block,
            to_block,
        };

        debug!(
            "Fetching {kind} logs for blocks [{from_block}-{}]",
            to_block.map_or_else(|| "latest".to_string(), |n| n.to_string())
        );

        let logs = self.source.get_logs(&query).await?;

        let records = logs
            .iter()
            .filter_map(|log| match EventRecord::from_log(kind, log) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping {kind} log: {e}");
                    None
                }
            })
            .collect();

        Ok(records)
    }

    /// Fetches the records of a stream over a block range using the stream's own event signature.
    pub async fn fetch_range(&self, kind: StreamKind, range: BlockRange) -> SyncResult<Vec<EventRecord>> {
        self.fetch(
            kind,
            TopicFilter::for_event(kind.event_signature()),
            range.from_block,
            Some(range.to_block),
        )
        .await
    }

    pub async fn fetch_block(&self, number: u64) -> SyncResult<BlockHeader> {
        self.source.get_block(number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{MockEventSource, fake_address, fake_hash, test_catalog, transfer_log},
        topics::TopicSlot,
    };
    use alloy::primitives::U256;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn query_is_translated_into_a_filter() {
        let contract = fake_address();
        let maker = fake_address();
        let query = LogQuery {
            address: Some(contract),
            topics: TopicFilter::for_event(StreamKind::SwapFills.event_signature())
                .with_topic(TopicSlot::Second, [crate::topics::address_topic(maker)]),
            from_block: 100,
            to_block: None,
        };

        let filter = Filter::from(&query);

        assert_eq!(filter.get_from_block(), Some(100));
        assert!(filter.topics[1].is_empty());
        assert!(!filter.topics[2].is_empty());
        assert!(filter.topics[2].matches(&crate::topics::address_topic(maker)));
        assert!(!filter.address.is_empty());
        assert!(filter.address.matches(&contract));
    }

    #[rstest]
    #[tokio::test]
    async fn fetch_keeps_source_order_and_skips_undecodable_logs() {
        let catalog = test_catalog();
        let (h1, h2) = (fake_hash(), fake_hash());
        let source = MockEventSource::default();
        source.push_log(transfer_log(
            fake_address(),
            fake_address(),
            fake_address(),
            U256::from(1),
            h2,
            11,
        ));
        let mut pending = transfer_log(
            fake_address(),
            fake_address(),
            fake_address(),
            U256::from(1),
            fake_hash(),
            11,
        );
        pending.transaction_hash = None;
        source.push_log(pending);
        source.push_log(transfer_log(
            fake_address(),
            fake_address(),
            fake_address(),
            U256::from(2),
            h1,
            10,
        ));
        let fetcher = LogFetcher::new(Arc::new(source), catalog);

        let records = fetcher
            .fetch_range(StreamKind::Erc20Transfers, BlockRange::new(10, 11).unwrap())
            .await
            .unwrap();

        assert_eq!(
            records.iter().map(|r| r.transaction_hash).collect::<Vec<_>>(),
            vec![h2, h1]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn empty_result_is_an_empty_sequence() {
        let fetcher = LogFetcher::new(Arc::new(MockEventSource::default()), test_catalog());

        let records = fetcher
            .fetch_range(StreamKind::ExchangeFills, BlockRange::new(1, 2).unwrap())
            .await
            .unwrap();

        assert!(records.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn transport_failures_are_propagated() {
        let source = MockEventSource::default();
        source.fail_stream(StreamKind::SwapFills);
        let fetcher = LogFetcher::new(Arc::new(source), test_catalog());

        let result = fetcher
            .fetch_range(StreamKind::SwapFills, BlockRange::new(1, 2).unwrap())
            .await;

        assert!(matches!(result, Err(SyncError::FetchFailure { .. })));
    }
}
