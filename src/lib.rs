// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Library of the Sancho crate.
//!
//! Sancho keeps a local view of exchange fills, cancels and failures, swap fills and cancels and ERC-20 transfers
//! consistent with the chain, one block at a time.

pub mod api_rest;
pub mod block_watcher;
pub use block_watcher::BlockWatcher;
pub mod cli;
pub mod configuration;
pub mod engine;
pub use engine::SyncEngine;
pub mod error;
pub use error::{SyncError, SyncResult};
pub mod events;
pub mod metrics;
pub mod source;
pub mod state;
pub mod sync_app;
pub use sync_app::SyncApp;
pub mod telemetry;
pub mod topics;

#[cfg(test)]
pub mod test_utils;

use alloy::primitives::B256;
use serde::Serialize;

/// Module with constants used throughout the application.
pub mod constants {
    /// Width of the one-time catch-up window, roughly a day of mainnet blocks.
    pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 7000;
    /// Width of the per-tick window. The previous block is reconciled again on every tick.
    pub const DEFAULT_TICK_WINDOW: u64 = 1;
    /// Default poll interval in seconds when watching the chain head.
    pub const DEFAULT_POLL_INTERVAL: u64 = 1;
    /// Base address for the API server that runs locally.
    pub const DEFAULT_API_SERVER_ADDRESS: &str = "127.0.0.1";
    /// Default port for the API server.
    pub const DEFAULT_API_SERVER_PORT: u16 = 9730;
    /// Default port for the metrics server.
    pub const DEFAULT_METRICS_PORT: u16 = 5054;
    /// Maximum number of retries of a rate limited RPC request.
    pub const DEFAULT_BACKOFF_LAYER_MAX_RETRIES: u32 = 10;
    /// Initial backoff of a rate limited RPC request, in milliseconds.
    pub const DEFAULT_BACKOFF_LAYER_BACKOFF_TIME: u64 = 1000;
    /// Compute units per second assumed for the RPC node.
    pub const DEFAULT_BACKOFF_LAYER_CUP_SIZE: u64 = 100;
    /// Mainnet deployment of the legacy exchange contract.
    pub const DEFAULT_LEGACY_EXCHANGE_ADDRESS: &str = "0x8fd3121013A07C57f0D69646E86E7a4880b467b7";
    /// Mainnet deployment of the swap contract.
    pub const DEFAULT_SWAP_ADDRESS: &str = "0x4572f2554421Bd64Bef1c22c8a81840E8D496BeA";
}

/// Error codes used when exiting the application.
pub mod error_codes {
    pub const ERROR_CODE_WRONG_INPUT_ARGUMENTS: i32 = 1;
    pub const ERROR_CODE_FAILED_TO_LOAD_CONFIGURATION_FROM_FILE: i32 = 2;
}

/// Inclusive window of blocks, `from_block <= to_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockRange {
    /// Builds a range, `None` when the bounds are inverted.
    pub fn new(from_block: u64, to_block: u64) -> Option<Self> {
        (from_block <= to_block).then_some(Self {
            from_block,
            to_block,
        })
    }

    /// Window reconciled on every tick: `[head - width, head]`.
    pub fn tick(head: u64, width: u64) -> Self {
        Self {
            from_block: head.saturating_sub(width),
            to_block: head,
        }
    }

    /// Window of the one-time catch-up: `[head - lookback, head]`.
    pub fn lookback(head: u64, lookback: u64) -> Self {
        Self::tick(head, lookback)
    }
}

/// Minimal block header data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
}

pub type RxCancellationToken = tokio::sync::broadcast::Receiver<()>;

/// Cancellation token for a graceful shutdown of the components of the app.
#[derive(Clone)]
pub struct CancellationToken(tokio::sync::broadcast::Sender<()>);

impl Default for CancellationToken {
    fn default() -> Self {
        Self(tokio::sync::broadcast::Sender::new(1))
    }
}

impl CancellationToken {
    pub fn subscribe(&self) -> RxCancellationToken {
        self.0.subscribe()
    }

    pub fn graceful_shutdown(&self) {
        // No receivers left means everything already stopped.
        let _ = self.0.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case::regular(1000, 1, 999)]
    #[case::genesis(0, 1, 0)]
    fn tick_window_overlaps_previous_block(#[case] head: u64, #[case] width: u64, #[case] from: u64) {
        assert_eq!(
            BlockRange::tick(head, width),
            BlockRange {
                from_block: from,
                to_block: head
            }
        );
    }

    #[rstest]
    #[case::regular(10_000, 3000)]
    #[case::young_chain(5000, 0)]
    fn lookback_window_saturates_at_genesis(#[case] head: u64, #[case] from: u64) {
        let range = BlockRange::lookback(head, constants::DEFAULT_LOOKBACK_BLOCKS);

        assert_eq!(range.from_block, from);
        assert_eq!(range.to_block, head);
    }

    #[rstest]
    fn inverted_range_is_rejected() {
        assert_eq!(BlockRange::new(11, 10), None);
        assert!(BlockRange::new(10, 10).is_some());
    }
}
