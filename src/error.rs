// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Error kinds surfaced by the synchronization engine.

use crate::events::StreamKind;
use alloy::primitives::B256;

/// Errors produced while reconciling event streams.
///
/// # Description
///
/// None of these errors is fatal to the process. A failure is scoped to the reconciliation or backfill that
/// triggered it: nothing gets dispatched, thus nothing is marked as known, and the next tick starts from a clean
/// state.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Transport level failure of a log or block fetch.
    #[error("Fetch failure ({context}): {reason}")]
    FetchFailure { context: String, reason: String },
    /// An empty address set was given where a non-empty one is required.
    #[error("Invalid filter input: {0}")]
    InvalidFilterInput(String),
    /// A raw log could not be turned into an event record.
    #[error("Failed to decode log in tx {transaction_hash:?}: {reason}")]
    Decode {
        transaction_hash: Option<B256>,
        reason: String,
    },
    /// The dispatch sink rejected a batch.
    #[error("Dispatch of {stream} failed: {reason}")]
    Dispatch { stream: String, reason: String },
    /// Historical fetches by address are only defined for the on-chain event streams.
    #[error("Historical fetch by address is not supported for the {0} stream")]
    UnsupportedHistoricalStream(StreamKind),
}

impl SyncError {
    /// Builds a fetch failure out of any displayable transport error.
    #[allow(clippy::needless_pass_by_value)]
    pub fn fetch<C: ToString, E: ToString>(context: C, e: E) -> Self {
        SyncError::FetchFailure {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    /// Builds a dispatch failure for the given target.
    #[allow(clippy::needless_pass_by_value)]
    pub fn dispatch<S: ToString, E: ToString>(stream: S, e: E) -> Self {
        SyncError::Dispatch {
            stream: stream.to_string(),
            reason: e.to_string(),
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
