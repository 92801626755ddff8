//! # history-sync
//!
//! Synchronizes ledger action-execution history from the host's in-memory
//! transactional store into a durable, queryable document store, without
//! blocking ledger processing.
//!
//! ## Overview
//!
//! - **Backpressure Queue**: bounded hand-off with adaptive producer delay
//! - **Consumer Worker**: one thread, batch drain, idempotent insert-if-absent
//! - **Lifecycle Bridge**: block-applied and irreversible-height notifications
//! - **Schema Bridge**: ABI-aware rendering with an LRU schema cache
//! - **Query Service**: filter/sort/limit plus reverse translation
//!
//! ## Architecture
//!
//! ```text
//! Ledger engine ──HistoryLifecycleApi──→ history-sync ──DocumentStore──→ database
//!                                             │
//!                                             ├── AbiProvider (account schemas)
//!                                             └── TransientIndex (reversible records)
//!
//! Query clients ──ActionHistoryApi──→ history-sync
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use history_sync::{HistorySyncService, SyncConfig};
//! use history_sync::ports::inbound::HistoryLifecycleApi;
//!
//! let service = HistorySyncService::new(SyncConfig::from_env()?, store, abis, index)?;
//! service.start()?;
//!
//! service.lifecycle().on_block_applied(&block);
//! service.lifecycle().on_irreversible(last_irreversible);
//!
//! service.shutdown();
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

pub use config::{ConfigError, SyncConfig};
pub use domain::{
    AbiSerializer, ActionHistoryQuery, BackpressureConfig, BackpressureQueue, DocumentError,
    Drained, PersistableAction, QueryError, SchemaError,
};
pub use ports::{
    AbiProvider, ActionHistoryApi, DocumentStore, HistoryLifecycleApi, StoreError,
    TransientIndex,
};
pub use service::{
    HistorySyncService, LifecycleBridge, QueryService, SchemaBridge, SyncError, WorkerState,
    WorkerStatsSnapshot,
};

/// Subsystem tag attached to lifecycle log events.
pub(crate) const SUBSYSTEM: &str = "history-sync";
