//! # History Sync Service
//!
//! Pipeline context: owns the queue, the schema bridge, the worker handle
//! and the store handle. One instance per host node; no process-wide state.
//!
//! ```text
//! host ──on_block_applied──→ TransientIndex
//! host ──on_irreversible───→ LifecycleBridge ──enqueue──→ BackpressureQueue
//!                                                             │
//!                                   ConsumerWorker ←──drain───┘
//!                                         │
//!                        SchemaBridge ──→ DocumentStore ←── QueryService
//! ```

pub mod bridge;
pub mod lifecycle;
pub mod query;
pub mod worker;

pub use bridge::SchemaBridge;
pub use lifecycle::LifecycleBridge;
pub use query::QueryService;
pub use worker::{
    ConsumerWorker, WorkerSettings, WorkerState, WorkerStats, WorkerStatsSnapshot,
    WORKER_THREAD_NAME,
};

use crate::config::{ConfigError, SyncConfig};
use crate::domain::query::INDEXED_PATHS;
use crate::domain::queue::BackpressureQueue;
use crate::ports::outbound::{AbiProvider, DocumentStore, StoreError, TransientIndex};
use crate::SUBSYSTEM;
use history_telemetry::log_event;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

/// Failures while starting the pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Index creation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Could not spawn consumer worker: {0}")]
    Spawn(#[from] std::io::Error),
}

pub struct HistorySyncService {
    config: SyncConfig,
    store: Arc<dyn DocumentStore>,
    queue: Arc<BackpressureQueue>,
    bridge: Arc<SchemaBridge>,
    stats: Arc<WorkerStats>,
    lifecycle: LifecycleBridge,
    query: QueryService,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HistorySyncService {
    /// Wire the pipeline. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn DocumentStore>,
        abi_provider: Arc<dyn AbiProvider>,
        transient_index: Arc<dyn TransientIndex>,
    ) -> Result<Self, SyncError> {
        config.validate()?;

        let queue = Arc::new(BackpressureQueue::new(config.backpressure()));
        let bridge = Arc::new(SchemaBridge::new(abi_provider, config.schema_cache_size));
        let lifecycle = LifecycleBridge::new(transient_index, Arc::clone(&queue));
        let query = QueryService::new(
            Arc::clone(&store),
            Arc::clone(&bridge),
            config.collection.clone(),
            config.max_query_limit,
        );

        Ok(Self {
            config,
            store,
            queue,
            bridge,
            stats: Arc::new(WorkerStats::default()),
            lifecycle,
            query,
            worker: Mutex::new(None),
        })
    }

    /// Create the collection indexes and spawn the consumer thread.
    ///
    /// Calling it again while the worker runs is a no-op. After
    /// [`shutdown`](Self::shutdown) it starts a fresh worker, which also
    /// picks up anything enqueued while stopped.
    pub fn start(&self) -> Result<(), SyncError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        for path in INDEXED_PATHS {
            self.store.create_index(&self.config.collection, path)?;
        }

        self.queue.reopen();
        let consumer = ConsumerWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.bridge),
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
            self.config.worker_settings(),
        );
        match consumer.spawn() {
            Ok(handle) => *worker = Some(handle),
            Err(err) => {
                self.queue.shutdown();
                return Err(err.into());
            }
        }

        log_event!(
            info,
            SUBSYSTEM,
            "Action history sync started",
            collection = %self.config.collection,
            max_queue_size = self.config.max_queue_size
        );
        Ok(())
    }

    /// Let the worker drain everything queued so far and wait for it.
    ///
    /// The worker slot stays locked until the thread has exited, so a
    /// concurrent `start` cannot reopen the queue under the old worker.
    pub fn shutdown(&self) {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };

        log_event!(
            info,
            SUBSYSTEM,
            "Shutting down action history sync, this may take a while",
            queue_depth = self.queue.len()
        );
        self.queue.shutdown();

        if handle.join().is_err() {
            log_event!(error, SUBSYSTEM, "Consumer worker panicked");
        } else {
            let stats = self.stats.snapshot();
            log_event!(
                info,
                SUBSYSTEM,
                "Action history sync stopped",
                persisted = stats.persisted,
                skipped = stats.skipped_existing,
                degraded = stats.degraded,
                abandoned = stats.abandoned
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &LifecycleBridge {
        &self.lifecycle
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn bridge(&self) -> &SchemaBridge {
        &self.bridge
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.stats.state()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Current producer delay step.
    pub fn backpressure_delay(&self) -> std::time::Duration {
        self.queue.current_delay()
    }
}

impl Drop for HistorySyncService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
