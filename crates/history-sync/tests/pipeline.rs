//! # End-to-End Pipeline Tests
//!
//! Block applied → irreversible → queue → worker → store → query, using the
//! in-memory adapters and a few failing store doubles.

use history_sync::adapters::{
    FileDocumentStore, InMemoryAbiProvider, InMemoryDocumentStore, InMemoryTransientIndex,
};
use history_sync::domain::{Document, Filter, FindOptions};
use history_sync::{
    ActionHistoryApi, ActionHistoryQuery, DocumentStore, HistoryLifecycleApi, HistorySyncService,
    StoreError, SyncConfig, TransientIndex, WorkerState,
};
use history_telemetry::{init_logging, TelemetryConfig};
use parking_lot::Mutex;
use serde_json::json;
use shared_types::{AccountId, ActionCall, ActionHistoryRecord, AppliedBlock, InlineAction};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// TEST HELPERS
// =============================================================================

const COLLECTION: &str = "action_traces";
const TOKEN: AccountId = AccountId(22);

const TOKEN_ABI: &str = r#"{
    "structs": [{ "name": "transfer", "fields": [
        { "name": "to", "type": "account" },
        { "name": "amount", "type": "uint64" }
    ]}],
    "actions": [{ "name": "transfer", "type": "transfer" }]
}"#;

fn transfer(storage_id: u64, block_num: u32, contract: AccountId, amount: u64) -> ActionHistoryRecord {
    let mut data = 5u64.to_le_bytes().to_vec();
    data.extend_from_slice(&amount.to_le_bytes());
    ActionHistoryRecord {
        storage_id,
        block_num,
        trx_in_block: 0,
        op_in_trx: 0,
        sender: AccountId(17),
        receiver: contract,
        act: ActionCall::new(contract, "transfer", data),
        inline_actions: vec![InlineAction {
            sender: contract,
            receiver: AccountId(17),
            act: ActionCall::new(AccountId(17), "notify", vec![]),
            inline_actions: vec![],
        }],
        result: vec![],
        txid: format!("tx-{storage_id}"),
        irreversible_state: false,
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig::default()
        .with_retry_backoff(Duration::from_millis(1))
        .with_delay_increment(Duration::from_micros(50))
}

struct Pipeline {
    service: HistorySyncService,
    index: Arc<InMemoryTransientIndex>,
    abis: Arc<InMemoryAbiProvider>,
}

fn pipeline_with_store(config: SyncConfig, store: Arc<dyn DocumentStore>) -> Pipeline {
    // Only the first test to get here installs the subscriber.
    let _ = init_logging(&TelemetryConfig::default().with_log_level("warn"));
    let index = Arc::new(InMemoryTransientIndex::new());
    let abis = Arc::new(InMemoryAbiProvider::new());
    abis.set_abi(TOKEN, TOKEN_ABI);
    let service = HistorySyncService::new(config, store, abis.clone(), index.clone()).unwrap();
    service.start().unwrap();
    Pipeline {
        service,
        index,
        abis,
    }
}

/// Poll until `condition` holds; the worker runs on its own thread.
fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached in time");
}

fn ids(records: &[ActionHistoryRecord]) -> Vec<u64> {
    records.iter().map(|r| r.storage_id).collect()
}

/// Fails the first `failures` inserts, then delegates. Logs successful ids.
struct FlakyStore {
    inner: InMemoryDocumentStore,
    failures_left: Mutex<u32>,
    inserted: Mutex<Vec<i64>>,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            failures_left: Mutex::new(failures),
            inserted: Mutex::new(Vec::new()),
        }
    }
}

impl DocumentStore for FlakyStore {
    fn create_index(&self, collection: &str, path: &str) -> Result<(), StoreError> {
        self.inner.create_index(collection, path)
    }

    fn find_by_id(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError> {
        self.inner.find_by_id(collection, id)
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::Unavailable {
                    message: "primary stepped down".to_string(),
                });
            }
        }
        let id = document["_id"].as_i64().unwrap_or_default();
        self.inner.insert_one(collection, document)?;
        self.inserted.lock().push(id);
        Ok(())
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.find(collection, filter, options)
    }
}

/// Unavailable until `online` is set; optionally rejects one `_id` outright.
struct OutageStore {
    inner: InMemoryDocumentStore,
    online: AtomicBool,
    reject: Option<i64>,
    failed_writes: AtomicU64,
}

impl OutageStore {
    fn new(reject: Option<i64>) -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            online: AtomicBool::new(false),
            reject,
            failed_writes: AtomicU64::new(0),
        }
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.online.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::Unavailable {
            message: "connection refused".to_string(),
        })
    }
}

impl DocumentStore for OutageStore {
    fn create_index(&self, collection: &str, path: &str) -> Result<(), StoreError> {
        self.inner.create_index(collection, path)
    }

    fn find_by_id(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError> {
        self.check_online()?;
        self.inner.find_by_id(collection, id)
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        self.check_online()?;
        if document["_id"].as_i64() == self.reject {
            return Err(StoreError::InvalidDocument {
                message: "document too large".to_string(),
            });
        }
        self.inner.insert_one(collection, document)
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.find(collection, filter, options)
    }
}

// =============================================================================
// LIFECYCLE TO STORE
// =============================================================================

#[test]
fn test_irreversible_records_reach_the_store() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let p = pipeline_with_store(fast_config(), store.clone());

    for (id, block) in [(1, 95), (2, 99), (3, 100), (4, 101)] {
        p.service
            .lifecycle()
            .on_block_applied(&AppliedBlock::new(block, vec![transfer(id, block, TOKEN, id * 10)]));
    }
    assert_eq!(p.service.lifecycle().on_irreversible(100), 2);
    assert_eq!(p.index.storage_ids(), vec![3, 4]);

    p.service.shutdown();
    assert_eq!(p.service.worker_state(), WorkerState::Stopped);
    assert_eq!(store.ids(COLLECTION), vec![1, 2]);

    let stored = store.get(COLLECTION, 2).unwrap();
    assert_eq!(stored["action"]["irreversibleState"], json!(true));
    assert_eq!(stored["action"]["act"]["args"], json!({ "to": "1.2.5", "amount": 20 }));
    assert_eq!(stored["action"]["act"]["contractId"], json!("1.2.22"));
    assert_eq!(stored["action"]["inlineActions"][0]["act"]["methodName"], json!("notify"));
}

#[test]
fn test_shutdown_drains_everything_enqueued_before_it() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let p = pipeline_with_store(fast_config(), store.clone());

    let records: Vec<ActionHistoryRecord> = (1..=200).map(|id| transfer(id, 1, TOKEN, id)).collect();
    p.service.lifecycle().on_block_applied(&AppliedBlock::new(1, records));
    assert_eq!(p.service.lifecycle().on_irreversible(2), 200);

    p.service.shutdown();
    assert_eq!(store.len(COLLECTION), 200);
    assert_eq!(p.service.stats().persisted, 200);
    assert_eq!(p.service.queue_depth(), 0);
}

#[test]
fn test_drop_shuts_the_worker_down() {
    let store = Arc::new(InMemoryDocumentStore::new());
    {
        let p = pipeline_with_store(fast_config(), store.clone());
        p.service
            .lifecycle()
            .on_block_applied(&AppliedBlock::new(3, vec![transfer(9, 3, TOKEN, 1)]));
        p.service.lifecycle().on_irreversible(4);
    }
    assert_eq!(store.ids(COLLECTION), vec![9]);
}

#[test]
fn test_same_storage_id_is_persisted_once() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let p = pipeline_with_store(fast_config(), store.clone());

    let lifecycle = p.service.lifecycle();
    lifecycle.on_block_applied(&AppliedBlock::new(1, vec![transfer(7, 1, TOKEN, 1)]));
    lifecycle.on_irreversible(2);
    // host replays the same record after a restart
    lifecycle.on_block_applied(&AppliedBlock::new(1, vec![transfer(7, 1, TOKEN, 999)]));
    lifecycle.on_irreversible(2);

    p.service.shutdown();
    assert_eq!(store.len(COLLECTION), 1);
    let stats = p.service.stats();
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.skipped_existing, 1);
    assert_eq!(
        store.get(COLLECTION, 7).unwrap()["action"]["act"]["args"]["amount"],
        json!(1)
    );
}

#[test]
fn test_undecodable_payload_is_stored_identity_only() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let p = pipeline_with_store(fast_config(), store.clone());

    let mut bad = transfer(5, 1, TOKEN, 1);
    bad.act.data.truncate(3);
    p.service
        .lifecycle()
        .on_block_applied(&AppliedBlock::new(1, vec![bad, transfer(6, 1, TOKEN, 2)]));
    p.service.lifecycle().on_irreversible(2);
    p.service.shutdown();

    assert_eq!(store.ids(COLLECTION), vec![5, 6]);
    let degraded = store.get(COLLECTION, 5).unwrap();
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded["_id"], json!(5));
    assert_eq!(p.service.stats().degraded, 1);
}

// =============================================================================
// STORE FAILURES
// =============================================================================

#[test]
fn test_worker_retries_after_transient_failure_in_order() {
    let store = Arc::new(FlakyStore::new(3));
    let p = pipeline_with_store(fast_config(), store.clone());

    let records: Vec<ActionHistoryRecord> = (1..=6).map(|id| transfer(id, 1, TOKEN, id)).collect();
    p.service.lifecycle().on_block_applied(&AppliedBlock::new(1, records));
    p.service.lifecycle().on_irreversible(2);
    p.service.shutdown();

    assert_eq!(*store.inserted.lock(), vec![1, 2, 3, 4, 5, 6]);
    let stats = p.service.stats();
    assert_eq!(stats.persisted, 6);
    assert_eq!(stats.abandoned, 0);
}

#[test]
fn test_store_outage_delays_but_never_drops_records() {
    let store = Arc::new(OutageStore::new(None));
    let config = fast_config().with_max_retry_backoff(Duration::from_millis(8));
    let p = pipeline_with_store(config, store.clone());

    let records: Vec<ActionHistoryRecord> = (1..=3).map(|id| transfer(id, 1, TOKEN, id)).collect();
    p.service.lifecycle().on_block_applied(&AppliedBlock::new(1, records));
    p.service.lifecycle().on_irreversible(2);

    // well past what a handful of fixed attempts would have covered
    wait_for(|| store.failed_writes.load(Ordering::Relaxed) >= 20);
    assert!(store.inner.is_empty(COLLECTION));
    assert_eq!(p.service.stats().abandoned, 0);

    store.online.store(true, Ordering::Relaxed);
    p.service.shutdown();

    assert_eq!(store.inner.ids(COLLECTION), vec![1, 2, 3]);
    let stats = p.service.stats();
    assert_eq!(stats.persisted, 3);
    assert_eq!(stats.abandoned, 0);
    assert_eq!(p.service.worker_state(), WorkerState::Stopped);
}

#[test]
fn test_rejected_document_is_abandoned_without_blocking_the_rest() {
    let store = Arc::new(OutageStore::new(Some(2)));
    store.online.store(true, Ordering::Relaxed);
    let p = pipeline_with_store(fast_config(), store.clone());

    let records: Vec<ActionHistoryRecord> = (1..=3).map(|id| transfer(id, 1, TOKEN, id)).collect();
    p.service.lifecycle().on_block_applied(&AppliedBlock::new(1, records));
    p.service.lifecycle().on_irreversible(2);
    p.service.shutdown();

    assert_eq!(store.inner.ids(COLLECTION), vec![1, 3]);
    let stats = p.service.stats();
    assert_eq!(stats.persisted, 2);
    assert_eq!(stats.abandoned, 1);
}

#[test]
fn test_file_store_keeps_history_across_restart() {
    let temp_dir = TempDir::new().unwrap();
    let first_run: Vec<ActionHistoryRecord> = (1..=3).map(|id| transfer(id, 1, TOKEN, id)).collect();
    {
        let store = Arc::new(FileDocumentStore::open(temp_dir.path()).unwrap());
        let p = pipeline_with_store(fast_config(), store);
        p.service
            .lifecycle()
            .on_block_applied(&AppliedBlock::new(1, first_run.clone()));
        p.service.lifecycle().on_irreversible(2);
        p.service.shutdown();
    }

    let store = Arc::new(FileDocumentStore::open(temp_dir.path()).unwrap());
    assert_eq!(store.ids(COLLECTION), vec![1, 2, 3]);
    let p = pipeline_with_store(fast_config(), store.clone());

    // the host replays block 1 after its own restart
    p.service
        .lifecycle()
        .on_block_applied(&AppliedBlock::new(1, vec![transfer(3, 1, TOKEN, 3)]));
    p.service
        .lifecycle()
        .on_block_applied(&AppliedBlock::new(2, vec![transfer(4, 2, TOKEN, 4)]));
    p.service.lifecycle().on_irreversible(3);
    p.service.shutdown();

    assert_eq!(store.ids(COLLECTION), vec![1, 2, 3, 4]);
    let stats = p.service.stats();
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.skipped_existing, 1);

    let found = p
        .service
        .query()
        .query_action_history(&ActionHistoryQuery::new().with_sender(TOKEN.instance()).with_limit(3))
        .unwrap();
    assert_eq!(ids(&found), vec![1, 2, 3]);
}

// =============================================================================
// QUERIES
// =============================================================================

#[test]
fn test_query_sender_or_receiver_reverse_limited() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let p = pipeline_with_store(fast_config(), store);
    let other = AccountId(40);

    let records = vec![
        transfer(1, 1, TOKEN, 1),
        transfer(2, 1, other, 1),
        transfer(3, 1, AccountId(41), 1),
        transfer(4, 1, TOKEN, 1),
        transfer(5, 1, other, 1),
    ];
    p.service.lifecycle().on_block_applied(&AppliedBlock::new(1, records));
    p.service.lifecycle().on_irreversible(2);
    p.service.shutdown();

    let query = ActionHistoryQuery::new()
        .with_sender(TOKEN.instance())
        .with_receiver(other.instance())
        .with_limit(2)
        .reversed();
    let found = p.service.query().query_action_history(&query).unwrap();
    assert_eq!(ids(&found), vec![5, 4]);

    let all = p
        .service
        .query()
        .query_action_history(&ActionHistoryQuery::new().with_sender(TOKEN.instance()))
        .unwrap();
    assert_eq!(ids(&all), vec![1, 4]);
}

#[test]
fn test_query_round_trip_restores_records() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let p = pipeline_with_store(fast_config(), store);

    let original = transfer(11, 4, TOKEN, 77);
    p.service
        .lifecycle()
        .on_block_applied(&AppliedBlock::new(4, vec![original.clone()]));
    p.service.lifecycle().on_irreversible(5);
    p.service.shutdown();

    let found = p
        .service
        .query()
        .query_action_history(&ActionHistoryQuery::new().with_txid("tx-11"))
        .unwrap();
    assert_eq!(found.len(), 1);
    let restored = &found[0];
    assert_eq!(restored.sender, original.sender);
    assert_eq!(restored.receiver, original.receiver);
    assert_eq!(restored.txid, original.txid);
    assert_eq!(restored.act, original.act);
    assert_eq!(restored.inline_actions, original.inline_actions);
    assert!(restored.irreversible_state);
}

#[test]
fn test_schema_change_after_invalidate() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let p = pipeline_with_store(fast_config(), store.clone());

    p.service.lifecycle().on_block_applied(&AppliedBlock::new(1, vec![transfer(1, 1, TOKEN, 3)]));
    p.service.lifecycle().on_irreversible(2);
    wait_for(|| p.service.stats().persisted == 1);

    p.abis.clear_abi(TOKEN);
    p.service.bridge().invalidate(TOKEN);
    p.service.lifecycle().on_block_applied(&AppliedBlock::new(2, vec![transfer(2, 2, TOKEN, 3)]));
    p.service.lifecycle().on_irreversible(3);
    p.service.shutdown();

    assert!(store.get(COLLECTION, 1).unwrap()["action"]["act"].get("args").is_some());
    assert!(store.get(COLLECTION, 2).unwrap()["action"]["act"].get("args").is_none());
}

// =============================================================================
// BACKPRESSURE
// =============================================================================

#[test]
fn test_concurrent_producers_under_backpressure() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let config = fast_config().with_max_queue_size(4);
    let p = Arc::new(pipeline_with_store(config, store.clone()));

    let producers: Vec<_> = (0..4u64)
        .map(|producer| {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                for n in 0..50u64 {
                    let id = producer * 1_000 + n;
                    let block = (n + 1) as u32;
                    p.service
                        .lifecycle()
                        .on_block_applied(&AppliedBlock::new(block, vec![transfer(id, block, TOKEN, n)]));
                    p.service.lifecycle().on_irreversible(block);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    p.service.lifecycle().on_irreversible(u32::MAX);
    p.service.shutdown();

    assert_eq!(store.len(COLLECTION), 200);
    assert_eq!(p.service.stats().persisted, 200);
    assert!(p.index.is_empty());
}
