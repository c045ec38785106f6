// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with utilities for testing.

use crate::{
    BlockHeader,
    error::{SyncError, SyncResult},
    events::{
        EventPayload, EventRecord, StreamCatalog, StreamKind,
        bindings::{Cancel, Canceled, Failed, Filled, Swap, Transfer},
    },
    source::{EventSource, LogQuery},
    state::{DispatchSink, MemoryStore},
    topics::TopicFilter,
};
use alloy::{
    primitives::{Address, B256, LogData, U256, address},
    rpc::types::Log,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use fake::{Fake, Faker};
use futures::future::BoxFuture;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

pub const LEGACY_EXCHANGE: Address = address!("0x8fd3121013A07C57f0D69646E86E7a4880b467b7");
pub const SWAP: Address = address!("0x4572f2554421Bd64Bef1c22c8a81840E8D496BeA");

/// Generates a random address.
pub fn fake_address() -> Address {
    let bytes: [u8; 20] = Faker.fake();
    Address::from(bytes)
}

/// Generates a random transaction hash.
pub fn fake_hash() -> B256 {
    let bytes: [u8; 32] = Faker.fake();
    B256::from(bytes)
}

fn fake_amount() -> U256 {
    U256::from(Faker.fake::<u64>())
}

pub fn test_catalog() -> StreamCatalog {
    StreamCatalog {
        legacy_exchange: LEGACY_EXCHANGE,
        swap: SWAP,
        legacy_exchange_start_block: 100,
        swap_start_block: 150,
    }
}

pub fn block_header(number: u64) -> BlockHeader {
    BlockHeader {
        number,
        hash: B256::left_padding_from(&number.to_be_bytes()),
        timestamp: 1_700_000_000 + number * 12,
    }
}

/// Builds a payload of the given stream whose maker is `maker`.
pub fn payload(kind: StreamKind, maker: Address) -> EventPayload {
    match kind {
        StreamKind::ExchangeFills => EventPayload::ExchangeFill(Filled {
            makerAddress: maker,
            makerAmount: fake_amount(),
            makerToken: fake_address(),
            takerAddress: fake_address(),
            takerAmount: fake_amount(),
            takerToken: fake_address(),
            expiration: fake_amount(),
            nonce: fake_amount(),
        }),
        StreamKind::ExchangeCancels => EventPayload::ExchangeCancel(Canceled {
            makerAddress: maker,
            makerAmount: fake_amount(),
            makerToken: fake_address(),
            takerAddress: fake_address(),
            takerAmount: fake_amount(),
            takerToken: fake_address(),
            expiration: fake_amount(),
            nonce: fake_amount(),
        }),
        StreamKind::ExchangeFailures => EventPayload::ExchangeFailure(Failed {
            code: U256::from(1),
            makerAddress: maker,
            makerAmount: fake_amount(),
            makerToken: fake_address(),
            takerAddress: fake_address(),
            takerAmount: fake_amount(),
            takerToken: fake_address(),
            expiration: fake_amount(),
            nonce: fake_amount(),
        }),
        StreamKind::SwapFills => EventPayload::SwapFill(Swap {
            nonce: fake_amount(),
            timestamp: fake_amount(),
            makerWallet: maker,
            makerParam: fake_amount(),
            makerToken: fake_address(),
            takerWallet: fake_address(),
            takerParam: fake_amount(),
            takerToken: fake_address(),
            affiliateWallet: Address::ZERO,
            affiliateParam: U256::ZERO,
            affiliateToken: Address::ZERO,
        }),
        StreamKind::SwapCancels => EventPayload::SwapCancel(Cancel {
            nonce: fake_amount(),
            makerWallet: maker,
        }),
        StreamKind::Erc20Transfers => EventPayload::Erc20Transfer(Transfer {
            from: maker,
            to: fake_address(),
            value: fake_amount(),
        }),
    }
}

fn log_data(payload: &EventPayload) -> LogData {
    match payload {
        EventPayload::ExchangeFill(e) => e.encode_log_data(),
        EventPayload::ExchangeCancel(e) => e.encode_log_data(),
        EventPayload::ExchangeFailure(e) => e.encode_log_data(),
        EventPayload::SwapFill(e) => e.encode_log_data(),
        EventPayload::SwapCancel(e) => e.encode_log_data(),
        EventPayload::Erc20Transfer(e) => e.encode_log_data(),
    }
}

/// Wraps an encoded event into a mined log.
pub fn mined_log(contract: Address, data: LogData, transaction_hash: B256, block_number: u64) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: contract,
            data,
        },
        block_hash: Some(block_header(block_number).hash),
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(transaction_hash),
        transaction_index: Some(0),
        log_index: Some(0),
        removed: false,
    }
}

/// Mined log of a stream, emitted by the contract the catalog assigns to it.
pub fn stream_log(
    catalog: &StreamCatalog,
    kind: StreamKind,
    maker: Address,
    transaction_hash: B256,
    block_number: u64,
) -> Log {
    let contract = catalog.contract_address(kind).unwrap_or_else(fake_address);
    mined_log(contract, log_data(&payload(kind, maker)), transaction_hash, block_number)
}

/// Mined ERC-20 transfer log.
pub fn transfer_log(
    token: Address,
    from: Address,
    to: Address,
    value: U256,
    transaction_hash: B256,
    block_number: u64,
) -> Log {
    mined_log(
        token,
        Transfer { from, to, value }.encode_log_data(),
        transaction_hash,
        block_number,
    )
}

/// Event record built directly, without going through a log.
pub fn record(kind: StreamKind, transaction_hash: B256, block_number: u64) -> EventRecord {
    EventRecord {
        stream: kind,
        transaction_hash,
        block_number,
        log_index: 0,
        contract: fake_address(),
        payload: payload(kind, fake_address()),
    }
}

/// Whether the topics of a log satisfy `filter`, the way a node evaluates them.
pub fn topics_match(filter: &TopicFilter, topics: &[B256]) -> bool {
    if topics.first() != Some(&filter.event_signature) {
        return false;
    }

    filter.indexed.iter().enumerate().all(|(idx, accepted)| {
        accepted.is_empty()
            || topics
                .get(idx + 1)
                .is_some_and(|topic| accepted.contains(topic))
    })
}

/// Whether a mined log falls into `query`: address, block window and topics.
pub fn query_matches(query: &LogQuery, log: &Log) -> bool {
    let block_number = log.block_number.unwrap_or_default();

    query.address.is_none_or(|expected| expected == log.address())
        && block_number >= query.from_block
        && query.to_block.is_none_or(|to| block_number <= to)
        && topics_match(&query.topics, log.topics())
}

/// Entry of the dispatch log kept by [RecordingSink].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEntry {
    Batch(StreamKind, Vec<B256>),
    Blocks(Vec<u64>),
}

/// [DispatchSink] that records every dispatch, in arrival order, before handing it to a [MemoryStore].
pub struct RecordingSink {
    store: Arc<MemoryStore>,
    history: Mutex<Vec<DispatchEntry>>,
}

impl RecordingSink {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            history: Mutex::default(),
        }
    }

    pub fn history(&self) -> Vec<DispatchEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, entry: DispatchEntry) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

#[async_trait]
impl DispatchSink for RecordingSink {
    async fn dispatch_batch(&self, kind: StreamKind, records: Vec<EventRecord>) -> SyncResult<()> {
        self.record(DispatchEntry::Batch(
            kind,
            records.iter().map(|r| r.transaction_hash).collect(),
        ));
        self.store.dispatch_batch(kind, records).await
    }

    async fn dispatch_blocks(&self, blocks: Vec<BlockHeader>) -> SyncResult<()> {
        self.record(DispatchEntry::Blocks(blocks.iter().map(|b| b.number).collect()));
        self.store.dispatch_blocks(blocks).await
    }
}

type FetchHook = Arc<dyn Fn(&LogQuery) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct MockInner {
    logs: Vec<Log>,
    failing_signatures: HashSet<B256>,
    failing_blocks: HashSet<u64>,
    latest: Option<u64>,
    queries: Vec<LogQuery>,
    block_requests: Vec<u64>,
    hook: Option<FetchHook>,
}

/// Scriptable [EventSource] serving logs from memory.
///
/// # Description
///
/// Queries are matched against the stored logs the way a node would: address, block window and topics. Every
/// query and block request is recorded. Failures can be scripted per stream (by event signature) and per block,
/// and a hook can run while a log fetch is in flight.
#[derive(Default)]
pub struct MockEventSource {
    inner: Mutex<MockInner>,
}

impl MockEventSource {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_log(&self, log: Log) {
        self.lock().logs.push(log);
    }

    pub fn set_latest(&self, number: u64) {
        self.lock().latest = Some(number);
    }

    pub fn fail_stream(&self, kind: StreamKind) {
        self.lock().failing_signatures.insert(kind.event_signature());
    }

    pub fn heal_stream(&self, kind: StreamKind) {
        self.lock().failing_signatures.remove(&kind.event_signature());
    }

    pub fn fail_block(&self, number: u64) {
        self.lock().failing_blocks.insert(number);
    }

    pub fn heal_block(&self, number: u64) {
        self.lock().failing_blocks.remove(&number);
    }

    /// Runs `hook` after a log query is recorded and before its result is returned.
    pub fn on_fetch<F>(&self, hook: F)
    where
        F: Fn(&LogQuery) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.lock().hook = Some(Arc::new(hook));
    }

    pub fn queries(&self) -> Vec<LogQuery> {
        self.lock().queries.clone()
    }

    pub fn block_requests(&self) -> Vec<u64> {
        self.lock().block_requests.clone()
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn get_logs(&self, query: &LogQuery) -> SyncResult<Vec<Log>> {
        let (result, hook) = {
            let mut inner = self.lock();
            inner.queries.push(query.clone());

            let result = if inner.failing_signatures.contains(&query.topics.event_signature) {
                Err(SyncError::fetch("mock logs", "connection reset"))
            } else {
                Ok(inner
                    .logs
                    .iter()
                    .filter(|log| query_matches(query, log))
                    .cloned()
                    .collect())
            };

            (result, inner.hook.clone())
        };

        if let Some(hook) = hook {
            hook(query).await;
        }
        tokio::task::yield_now().await;

        result
    }

    async fn get_block(&self, number: u64) -> SyncResult<BlockHeader> {
        let failing = {
            let mut inner = self.lock();
            inner.block_requests.push(number);
            inner.failing_blocks.contains(&number)
        };
        tokio::task::yield_now().await;

        if failing {
            Err(SyncError::fetch(format!("mock block {number}"), "timeout"))
        } else {
            Ok(block_header(number))
        }
    }

    async fn get_latest_block(&self) -> SyncResult<BlockHeader> {
        let latest = self.lock().latest;

        latest
            .map(block_header)
            .ok_or_else(|| SyncError::fetch("mock latest block", "no head yet"))
    }
}
