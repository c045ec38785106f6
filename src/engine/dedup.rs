// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Filtering of fetched records against the identifiers already known for their stream.

use crate::events::EventRecord;
use alloy::primitives::B256;
use std::collections::HashSet;

/// Keeps the candidates whose transaction hash is not in `known`, in their original order.
///
/// Duplicates within the candidate batch itself are kept: only the already known set is cross-referenced.
pub fn dedup(candidates: Vec<EventRecord>, known: &HashSet<B256>) -> Vec<EventRecord> {
    candidates
        .into_iter()
        .filter(|record| !known.contains(&record.transaction_hash))
        .collect()
}
