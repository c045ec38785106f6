// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Catalogue of the monitored event streams and the records fetched from them.

use crate::{
    error::{SyncError, SyncResult},
    topics::TopicSlot,
};
use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Solidity bindings of the events the engine follows.
pub mod bindings {
    use super::sol;

    sol! {
        #[derive(Debug, PartialEq, Eq)]
        event Filled(
            address indexed makerAddress,
            uint256 makerAmount,
            address indexed makerToken,
            address takerAddress,
            uint256 takerAmount,
            address indexed takerToken,
            uint256 expiration,
            uint256 nonce
        );

        #[derive(Debug, PartialEq, Eq)]
        event Canceled(
            address indexed makerAddress,
            uint256 makerAmount,
            address indexed makerToken,
            address takerAddress,
            uint256 takerAmount,
            address indexed takerToken,
            uint256 expiration,
            uint256 nonce
        );

        #[derive(Debug, PartialEq, Eq)]
        event Failed(
            uint256 code,
            address indexed makerAddress,
            uint256 makerAmount,
            address indexed makerToken,
            address takerAddress,
            uint256 takerAmount,
            address indexed takerToken,
            uint256 expiration,
            uint256 nonce
        );

        #[derive(Debug, PartialEq, Eq)]
        event Swap(
            uint256 indexed nonce,
            uint256 timestamp,
            address indexed makerWallet,
            uint256 makerParam,
            address makerToken,
            address indexed takerWallet,
            uint256 takerParam,
            address takerToken,
            address affiliateWallet,
            uint256 affiliateParam,
            address affiliateToken
        );

        #[derive(Debug, PartialEq, Eq)]
        event Cancel(uint256 indexed nonce, address indexed makerWallet);

        #[derive(Debug, PartialEq, Eq)]
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

use bindings::{Cancel, Canceled, Failed, Filled, Swap, Transfer};

/// One category of on-chain event tracked independently.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    ExchangeFills,
    ExchangeCancels,
    ExchangeFailures,
    SwapFills,
    SwapCancels,
    Erc20Transfers,
}

/// Contract a stream is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamContract {
    LegacyExchange,
    Swap,
    /// No address filter, any token contract.
    AnyToken,
}

impl StreamKind {
    /// The five streams emitted by the exchange and swap contracts.
    pub const ON_CHAIN: [StreamKind; 5] = [
        StreamKind::ExchangeFills,
        StreamKind::ExchangeCancels,
        StreamKind::ExchangeFailures,
        StreamKind::SwapFills,
        StreamKind::SwapCancels,
    ];

    /// Streams covered by the one-time wide catch-up.
    pub const CATCH_UP: [StreamKind; 2] = [StreamKind::ExchangeFills, StreamKind::SwapFills];

    pub fn event_signature(&self) -> B256 {
        match self {
            StreamKind::ExchangeFills => Filled::SIGNATURE_HASH,
            StreamKind::ExchangeCancels => Canceled::SIGNATURE_HASH,
            StreamKind::ExchangeFailures => Failed::SIGNATURE_HASH,
            StreamKind::SwapFills => Swap::SIGNATURE_HASH,
            StreamKind::SwapCancels => Cancel::SIGNATURE_HASH,
            StreamKind::Erc20Transfers => Transfer::SIGNATURE_HASH,
        }
    }

    pub fn contract(&self) -> StreamContract {
        match self {
            StreamKind::ExchangeFills | StreamKind::ExchangeCancels | StreamKind::ExchangeFailures => {
                StreamContract::LegacyExchange
            }
            StreamKind::SwapFills | StreamKind::SwapCancels => StreamContract::Swap,
            StreamKind::Erc20Transfers => StreamContract::AnyToken,
        }
    }

    /// Indexed topic slot holding the maker of the order, if the stream has one.
    ///
    /// The legacy exchange indexes the maker first, while the swap contract indexes the nonce first and the maker
    /// wallet second.
    pub fn maker_topic_slot(&self) -> Option<TopicSlot> {
        match self.contract() {
            StreamContract::LegacyExchange => Some(TopicSlot::First),
            StreamContract::Swap => Some(TopicSlot::Second),
            StreamContract::AnyToken => None,
        }
    }
}

/// Resolves every stream to the contract it is read from and where its history starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCatalog {
    pub legacy_exchange: Address,
    pub swap: Address,
    pub legacy_exchange_start_block: u64,
    pub swap_start_block: u64,
}

impl StreamCatalog {
    /// Address filter for the stream. `None` means logs from any contract.
    pub fn contract_address(&self, kind: StreamKind) -> Option<Address> {
        match kind.contract() {
            StreamContract::LegacyExchange => Some(self.legacy_exchange),
            StreamContract::Swap => Some(self.swap),
            StreamContract::AnyToken => None,
        }
    }

    /// First block worth scanning when the full history of a stream is requested.
    pub fn history_start(&self, kind: StreamKind) -> u64 {
        match kind.contract() {
            StreamContract::LegacyExchange => self.legacy_exchange_start_block,
            StreamContract::Swap => self.swap_start_block,
            StreamContract::AnyToken => 0,
        }
    }
}

/// Decoded, event specific part of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    ExchangeFill(Filled),
    ExchangeCancel(Canceled),
    ExchangeFailure(Failed),
    SwapFill(Swap),
    SwapCancel(Cancel),
    Erc20Transfer(Transfer),
}

impl EventPayload {
    /// Decodes a raw log according to the event layout of the given stream.
    pub fn decode(kind: StreamKind, log: &Log) -> Result<Self, alloy::sol_types::Error> {
        let payload = match kind {
            StreamKind::ExchangeFills => EventPayload::ExchangeFill(log.log_decode::<Filled>()?.inner.data),
            StreamKind::ExchangeCancels => {
                EventPayload::ExchangeCancel(log.log_decode::<Canceled>()?.inner.data)
            }
            StreamKind::ExchangeFailures => {
                EventPayload::ExchangeFailure(log.log_decode::<Failed>()?.inner.data)
            }
            StreamKind::SwapFills => EventPayload::SwapFill(log.log_decode::<Swap>()?.inner.data),
            StreamKind::SwapCancels => EventPayload::SwapCancel(log.log_decode::<Cancel>()?.inner.data),
            StreamKind::Erc20Transfers => {
                EventPayload::Erc20Transfer(log.log_decode::<Transfer>()?.inner.data)
            }
        };

        Ok(payload)
    }

    /// Maker of the order, when the event refers to one.
    pub fn maker(&self) -> Option<Address> {
        match self {
            EventPayload::ExchangeFill(e) => Some(e.makerAddress),
            EventPayload::ExchangeCancel(e) => Some(e.makerAddress),
            EventPayload::ExchangeFailure(e) => Some(e.makerAddress),
            EventPayload::SwapFill(e) => Some(e.makerWallet),
            EventPayload::SwapCancel(e) => Some(e.makerWallet),
            EventPayload::Erc20Transfer(_) => None,
        }
    }
}

/// One observed log of a stream.
///
/// # Description
///
/// Records are immutable once fetched. The transaction hash identifies the record within its stream and is what
/// the deduplication runs on. Ownership moves to the state collaborator once the record gets dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub stream: StreamKind,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub contract: Address,
    pub payload: EventPayload,
}

impl EventRecord {
    /// Builds a record out of a mined log.
    ///
    /// # Description
    ///
    /// Pending logs (no transaction hash or block number yet) are rejected, the same as logs whose data doesn't
    /// match the event layout of the stream.
    pub fn from_log(stream: StreamKind, log: &Log) -> SyncResult<Self> {
        let transaction_hash = log.transaction_hash.ok_or_else(|| SyncError::Decode {
            transaction_hash: None,
            reason: "log without transaction hash".to_string(),
        })?;
        let block_number = log.block_number.ok_or_else(|| SyncError::Decode {
            transaction_hash: Some(transaction_hash),
            reason: "log without block number".to_string(),
        })?;
        let payload = EventPayload::decode(stream, log).map_err(|e| SyncError::Decode {
            transaction_hash: Some(transaction_hash),
            reason: e.to_string(),
        })?;

        Ok(Self {
            stream,
            transaction_hash,
            block_number,
            log_index: log.log_index.unwrap_or_default(),
            contract: log.address(),
            payload,
        })
    }
}
