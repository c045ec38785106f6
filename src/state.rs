// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the interfaces towards the state collaborator, and an in-memory implementation of them.
//!
//! # Description
//!
//! The engine never mutates the known sets itself. It reads snapshots through [StateView] and hands new data to a
//! [DispatchSink]; the collaborator behind both traits decides how dispatched data becomes known.

use crate::{
    BlockHeader,
    error::SyncResult,
    events::{EventRecord, StreamKind},
};
use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::debug;

/// Read-only queries over the collaborator's state.
///
/// Every call returns an owned snapshot: later mutations of the state don't leak into a snapshot already taken.
pub trait StateView: Send + Sync {
    /// Transaction hashes already known for a stream.
    fn known_identifiers(&self, kind: StreamKind) -> HashSet<B256>;
    /// Numbers of the blocks already known.
    fn known_block_numbers(&self) -> HashSet<u64>;
    /// Wallets whose ERC-20 transfers are followed.
    fn tracked_addresses(&self) -> Vec<Address>;
    /// Latest block observed, if any.
    fn latest_block(&self) -> Option<BlockHeader>;
}

/// Sink accepting the data produced by the engine.
#[async_trait]
pub trait DispatchSink: Send + Sync {
    /// Hands over a batch of new records of a stream.
    async fn dispatch_batch(&self, kind: StreamKind, records: Vec<EventRecord>) -> SyncResult<()>;
    /// Hands over a set of fetched blocks.
    async fn dispatch_blocks(&self, blocks: Vec<BlockHeader>) -> SyncResult<()>;
}

#[derive(Default)]
struct StoreInner {
    events: HashMap<StreamKind, Vec<EventRecord>>,
    event_keys: HashMap<StreamKind, HashSet<(B256, u64)>>,
    blocks: BTreeMap<u64, BlockHeader>,
    tracked: BTreeSet<Address>,
    latest: Option<BlockHeader>,
}

/// In-process state collaborator.
///
/// # Description
///
/// Merges dispatched batches idempotently: a record already stored (same transaction hash and log index) is not
/// stored twice, and a block dispatched twice overwrites itself. Nothing is persisted.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn with_tracked_addresses<I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = Address>,
    {
        let store = Self::default();
        store.write().tracked.extend(addresses);
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a new chain head. Older heads are ignored.
    pub fn set_latest_block(&self, block: BlockHeader) {
        let mut inner = self.write();
        if inner.latest.is_none_or(|latest| latest.number < block.number) {
            inner.latest = Some(block);
        }
    }

    /// Adds a wallet to the tracked set. Returns false if it was already tracked.
    pub fn track_address(&self, address: Address) -> bool {
        self.write().tracked.insert(address)
    }

    /// Records stored for a stream, in dispatch order.
    pub fn events(&self, kind: StreamKind) -> Vec<EventRecord> {
        self.read().events.get(&kind).cloned().unwrap_or_default()
    }

    /// Number of records stored per stream.
    pub fn event_counts(&self) -> BTreeMap<StreamKind, usize> {
        self.read()
            .events
            .iter()
            .map(|(kind, records)| (*kind, records.len()))
            .collect()
    }

    pub fn block_count(&self) -> usize {
        self.read().blocks.len()
    }
}

impl StateView for MemoryStore {
    fn known_identifiers(&self, kind: StreamKind) -> HashSet<B256> {
        self.read()
            .events
            .get(&kind)
            .map(|records| records.iter().map(|r| r.transaction_hash).collect())
            .unwrap_or_default()
    }

    fn known_block_numbers(&self) -> HashSet<u64> {
        self.read().blocks.keys().copied().collect()
    }

    fn tracked_addresses(&self) -> Vec<Address> {
        self.read().tracked.iter().copied().collect()
    }

    fn latest_block(&self) -> Option<BlockHeader> {
        self.read().latest
    }
}

#[async_trait]
impl DispatchSink for MemoryStore {
    async fn dispatch_batch(&self, kind: StreamKind, records: Vec<EventRecord>) -> SyncResult<()> {
        let mut inner = self.write();
        let StoreInner {
            events, event_keys, ..
        } = &mut *inner;

        let keys = event_keys.entry(kind).or_default();
        let stored = events.entry(kind).or_default();
        let mut added = 0;
        for record in records {
            if keys.insert((record.transaction_hash, record.log_index)) {
                stored.push(record);
                added += 1;
            }
        }

        debug!("Stored {added} new {kind} records");

        Ok(())
    }

    async fn dispatch_blocks(&self, blocks: Vec<BlockHeader>) -> SyncResult<()> {
        let mut inner = self.write();
        for block in blocks {
            inner.blocks.insert(block.number, block);
        }

        Ok(())
    }
}
