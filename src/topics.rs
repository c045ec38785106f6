// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module that builds the topic filters for the `eth_getLogs` calls.

use crate::{
    error::{SyncError, SyncResult},
    events::{StreamKind, bindings::Transfer},
};
use alloy::{
    primitives::{Address, B256},
    sol_types::SolEvent,
};

/// Indexed topic position of a log, after the event signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicSlot {
    First,
    Second,
    Third,
}

impl TopicSlot {
    fn index(self) -> usize {
        match self {
            TopicSlot::First => 0,
            TopicSlot::Second => 1,
            TopicSlot::Third => 2,
        }
    }
}

/// Topic constraints of a log query.
///
/// # Description
///
/// The first topic always pins the event signature. The remaining three indexed slots hold a list of accepted
/// values each: an empty list accepts anything (OR condition within a slot, AND condition across slots).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub event_signature: B256,
    pub indexed: [Vec<B256>; 3],
}

impl TopicFilter {
    /// Filter that only pins the event signature.
    pub fn for_event(event_signature: B256) -> Self {
        Self {
            event_signature,
            indexed: Default::default(),
        }
    }

    /// Constrains an indexed topic to the given values.
    pub fn with_topic<I>(mut self, slot: TopicSlot, values: I) -> Self
    where
        I: IntoIterator<Item = B256>,
    {
        self.indexed[slot.index()] = values.into_iter().collect();
        self
    }
}

/// ABI encodes an address into an indexed topic word.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

/// Builds the "from any of these" and "to any of these" filters for ERC-20 transfers.
///
/// # Description
///
/// An empty watch list means "fetch nothing", never "fetch everything", thus it is rejected instead of producing
/// an unconstrained filter. Callers are expected to short-circuit before reaching this point.
pub fn erc20_transfer_topics(addresses: &[Address]) -> SyncResult<(TopicFilter, TopicFilter)> {
    if addresses.is_empty() {
        return Err(SyncError::InvalidFilterInput(
            "ERC-20 transfer topics need at least one address".to_string(),
        ));
    }

    let words = addresses.iter().copied().map(address_topic).collect::<Vec<_>>();
    let from_topics = TopicFilter::for_event(Transfer::SIGNATURE_HASH).with_topic(TopicSlot::First, words.clone());
    let to_topics = TopicFilter::for_event(Transfer::SIGNATURE_HASH).with_topic(TopicSlot::Second, words);

    Ok((from_topics, to_topics))
}

/// Builds the filter matching the events of a stream whose maker is `maker`.
pub fn maker_topics(kind: StreamKind, maker: Address) -> SyncResult<TopicFilter> {
    let slot = kind
        .maker_topic_slot()
        .ok_or(SyncError::UnsupportedHistoricalStream(kind))?;

    Ok(TopicFilter::for_event(kind.event_signature()).with_topic(slot, [address_topic(maker)]))
}
