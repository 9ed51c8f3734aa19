// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Counters describing the activity of a payload builder.
#[derive(Debug, Default)]
pub struct BuilderStats {
    total_calls: AtomicU64,
    total_items: AtomicU64,
    write_item_errors: AtomicU64,
    payload_fulls: AtomicU64,
    item_drops: AtomicU64,
    compressor_locks: AtomicI64,
    total_lock_time_ns: AtomicU64,
    serialization_time_ns: AtomicU64,
}

/// Point-in-time copy of [`BuilderStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsSnapshot {
    pub total_calls: u64,
    pub total_items: u64,
    pub write_item_errors: u64,
    pub payload_fulls: u64,
    pub item_drops: u64,
    /// Callers currently blocked waiting for the shared buffers.
    pub compressor_locks: i64,
    pub total_lock_time_ns: u64,
    pub serialization_time_ns: u64,
}

fn nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

impl BuilderStats {
    pub(crate) fn call(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn item(&self) {
        self.total_items.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write_item_error(&self) {
        self.write_item_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn payload_full(&self) {
        self.payload_fulls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn item_drop(&self) {
        self.item_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lock_wait_started(&self) {
        self.compressor_locks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lock_wait_finished(&self, waited: Duration) {
        self.compressor_locks.fetch_sub(1, Ordering::Relaxed);
        self.total_lock_time_ns
            .fetch_add(nanos(waited), Ordering::Relaxed);
    }

    pub(crate) fn serialization_time(&self, elapsed: Duration) {
        self.serialization_time_ns
            .fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_items: self.total_items.load(Ordering::Relaxed),
            write_item_errors: self.write_item_errors.load(Ordering::Relaxed),
            payload_fulls: self.payload_fulls.load(Ordering::Relaxed),
            item_drops: self.item_drops.load(Ordering::Relaxed),
            compressor_locks: self.compressor_locks.load(Ordering::Relaxed),
            total_lock_time_ns: self.total_lock_time_ns.load(Ordering::Relaxed),
            serialization_time_ns: self.serialization_time_ns.load(Ordering::Relaxed),
        }
    }
}
