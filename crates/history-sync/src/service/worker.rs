//! # Consumer Worker
//!
//! The single background thread that drains the queue and writes to the
//! document store.
//!
//! ```text
//! [Waiting] ──wake──→ [Draining] ──records──→ [Processing] ──→ [Waiting]
//!                         │
//!                         └── empty + shutdown + nothing pending ──→ [Stopped]
//! ```
//!
//! Each record is rendered, looked up by `_id` and inserted only if absent.
//! When the store is unavailable, the failing record and everything behind
//! it stay pending in order and are retried until the store comes back. The
//! pause starts at `retry_backoff` and doubles per consecutive failed round,
//! up to `max_retry_backoff`. Only a non-transient store error abandons a
//! record.

use crate::domain::queue::BackpressureQueue;
use crate::metrics;
use crate::ports::outbound::{DocumentStore, StoreError};
use crate::service::bridge::SchemaBridge;
use shared_types::ActionHistoryRecord;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Name of the consumer thread.
pub const WORKER_THREAD_NAME: &str = "history-sync-consumer";

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Waiting = 0,
    Draining = 1,
    Processing = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Waiting,
            1 => Self::Draining,
            2 => Self::Processing,
            _ => Self::Stopped,
        }
    }
}

/// Counters shared between the worker and its observers.
#[derive(Debug)]
pub struct WorkerStats {
    batches: AtomicU64,
    persisted: AtomicU64,
    skipped_existing: AtomicU64,
    degraded: AtomicU64,
    abandoned: AtomicU64,
    state: AtomicU8,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    /// Non-empty batches processed.
    pub batches: u64,
    /// Documents inserted (including identity-only ones).
    pub persisted: u64,
    /// Records whose `_id` already existed.
    pub skipped_existing: u64,
    /// Inserted as identity-only.
    pub degraded: u64,
    /// Rejected by the store with a non-transient error.
    pub abandoned: u64,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self {
            batches: AtomicU64::new(0),
            persisted: AtomicU64::new(0),
            skipped_existing: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            state: AtomicU8::new(WorkerState::Waiting as u8),
        }
    }
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            skipped_existing: self.skipped_existing.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Worker tuning, taken from `SyncConfig`.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub collection: String,
    pub slow_batch_threshold: Duration,
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistOutcome {
    Inserted { degraded: bool },
    AlreadyPresent,
}

struct PendingRecord {
    record: ActionHistoryRecord,
    attempts: u32,
}

pub struct ConsumerWorker {
    queue: Arc<BackpressureQueue>,
    bridge: Arc<SchemaBridge>,
    store: Arc<dyn DocumentStore>,
    stats: Arc<WorkerStats>,
    settings: WorkerSettings,
    pending: VecDeque<PendingRecord>,
    failed_rounds: u32,
}

impl ConsumerWorker {
    pub fn new(
        queue: Arc<BackpressureQueue>,
        bridge: Arc<SchemaBridge>,
        store: Arc<dyn DocumentStore>,
        stats: Arc<WorkerStats>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            bridge,
            store,
            stats,
            settings,
            pending: VecDeque::new(),
            failed_rounds: 0,
        }
    }

    /// Run the worker on its own named thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    /// Worker loop; returns once shutdown was requested and everything
    /// drained has been handled.
    pub fn run(mut self) {
        tracing::debug!("[history-sync] Consumer worker started");

        loop {
            self.stats.set_state(WorkerState::Waiting);
            // Never block while retries are pending.
            let timeout = (!self.pending.is_empty()).then_some(Duration::ZERO);
            let drained = self.queue.wait_and_drain(timeout);

            self.stats.set_state(WorkerState::Draining);
            let drained_nothing = drained.is_empty();
            let shutdown_requested = drained.shutdown_requested;
            self.pending.extend(drained.records.into_iter().map(|record| PendingRecord {
                record,
                attempts: 0,
            }));

            if !self.pending.is_empty() {
                self.stats.set_state(WorkerState::Processing);
                if self.process_pending() {
                    self.failed_rounds = 0;
                } else {
                    thread::sleep(self.retry_delay());
                    self.failed_rounds = self.failed_rounds.saturating_add(1);
                }
            }

            if drained_nothing && shutdown_requested && self.pending.is_empty() {
                break;
            }
        }

        self.stats.set_state(WorkerState::Stopped);
        tracing::debug!("[history-sync] Consumer worker stopped");
    }

    /// Process pending records in order. Returns `false` if a store failure
    /// left records pending.
    fn process_pending(&mut self) -> bool {
        let started = Instant::now();
        let mut processed = 0usize;
        let mut completed = true;

        while let Some(mut entry) = self.pending.pop_front() {
            match self.persist(&entry.record) {
                Ok(outcome) => {
                    processed += 1;
                    self.record_outcome(outcome);
                }
                Err(err) => {
                    entry.attempts += 1;
                    if !err.is_transient() {
                        self.abandon(&entry, &err);
                        continue;
                    }
                    tracing::warn!(
                        storage_id = entry.record.storage_id,
                        attempt = entry.attempts,
                        pending = self.pending.len() + 1,
                        error = %err,
                        "[history-sync] Store unavailable, retrying batch"
                    );
                    self.pending.push_front(entry);
                    completed = false;
                    break;
                }
            }
        }

        if processed > 0 {
            self.stats.batches.fetch_add(1, Ordering::Relaxed);
            self.report_batch(processed, started.elapsed());
        }
        completed
    }

    /// Pause before the next retry round.
    fn retry_delay(&self) -> Duration {
        let doublings = self.failed_rounds.min(16);
        self.settings
            .retry_backoff
            .saturating_mul(1u32 << doublings)
            .min(self.settings.max_retry_backoff)
    }

    fn persist(&self, record: &ActionHistoryRecord) -> Result<PersistOutcome, StoreError> {
        let collection = self.settings.collection.as_str();
        let action = self.bridge.to_persistable(record);
        let id = action.id();
        let degraded = action.is_degraded();

        if self.store.find_by_id(collection, id)?.is_some() {
            tracing::debug!(storage_id = record.storage_id, "[history-sync] Already stored");
            return Ok(PersistOutcome::AlreadyPresent);
        }

        match self.store.insert_one(collection, action.into_document()) {
            Ok(()) => Ok(PersistOutcome::Inserted { degraded }),
            Err(StoreError::DuplicateKey { .. }) => Ok(PersistOutcome::AlreadyPresent),
            Err(err) => Err(err),
        }
    }

    fn record_outcome(&self, outcome: PersistOutcome) {
        match outcome {
            PersistOutcome::Inserted { degraded } => {
                self.stats.persisted.fetch_add(1, Ordering::Relaxed);
                metrics::record_persisted();
                if degraded {
                    self.stats.degraded.fetch_add(1, Ordering::Relaxed);
                    metrics::record_degraded();
                }
            }
            PersistOutcome::AlreadyPresent => {
                self.stats.skipped_existing.fetch_add(1, Ordering::Relaxed);
                metrics::record_skipped();
            }
        }
    }

    fn abandon(&self, entry: &PendingRecord, err: &StoreError) {
        tracing::error!(
            storage_id = entry.record.storage_id,
            block_num = entry.record.block_num,
            txid = %entry.record.txid,
            attempts = entry.attempts,
            error = %err,
            "[history-sync] Store rejected record, giving up"
        );
        self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
        metrics::record_abandoned();
    }

    fn report_batch(&self, size: usize, elapsed: Duration) {
        let per_record = elapsed / size as u32;
        metrics::observe_record_process_time(per_record);

        if elapsed > self.settings.slow_batch_threshold {
            tracing::info!(
                batch_size = size,
                total_ms = elapsed.as_millis() as u64,
                per_record_us = per_record.as_micros() as u64,
                "[history-sync] Slow batch"
            );
        }
    }
}
