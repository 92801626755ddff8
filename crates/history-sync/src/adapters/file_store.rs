//! # File-Backed Document Store
//!
//! Durable `DocumentStore` for hosts that do not run a database server. Each
//! collection is an append-only JSON-lines log `<dir>/<collection>.jsonl`;
//! the documents are replayed into an [`InMemoryDocumentStore`] on open,
//! which serves lookups, secondary indexes and `_id`-ordered finds.
//!
//! ```text
//! insert_one ──→ _id known? ──yes──→ DuplicateKey
//!                    │ no
//!                    └──→ append line + fsync ──→ in-memory insert
//! ```
//!
//! A torn final line (crash mid-append) is dropped on open and the log is
//! cut back to the last complete document.

use crate::adapters::memory_store::InMemoryDocumentStore;
use crate::domain::document::{Document, Filter, FindOptions, ID_FIELD};
use crate::ports::outbound::{DocumentStore, StoreError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const LOG_EXTENSION: &str = "jsonl";

fn io_error(context: &str, err: io::Error) -> StoreError {
    StoreError::Unavailable {
        message: format!("{context}: {err}"),
    }
}

pub struct FileDocumentStore {
    dir: PathBuf,
    documents: InMemoryDocumentStore,
    /// Open append handles; the lock also serializes check-then-append.
    logs: Mutex<HashMap<String, File>>,
}

impl FileDocumentStore {
    /// Open (or create) a store rooted at `dir` and replay every collection
    /// log found there.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_error("create store directory", e))?;

        let store = Self {
            dir,
            documents: InMemoryDocumentStore::new(),
            logs: Mutex::new(HashMap::new()),
        };

        let entries = fs::read_dir(&store.dir).map_err(|e| io_error("list store directory", e))?;
        for entry in entries {
            let path = entry.map_err(|e| io_error("list store directory", e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(collection) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            store.replay(collection, &path)?;
        }

        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.documents.len(collection)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.documents.is_empty(collection)
    }

    /// All `_id`s of a collection in ascending order.
    pub fn ids(&self, collection: &str) -> Vec<i64> {
        self.documents.ids(collection)
    }

    /// Log file backing `collection`.
    pub fn log_path(&self, collection: &str) -> Result<PathBuf, StoreError> {
        let valid = !collection.is_empty()
            && !collection.starts_with('.')
            && !collection.contains(['/', '\\']);
        if !valid {
            return Err(StoreError::InvalidDocument {
                message: format!("collection name {collection:?} is not a file name"),
            });
        }
        Ok(self.dir.join(format!("{collection}.{LOG_EXTENSION}")))
    }

    fn open_log(&self, collection: &str) -> Result<File, StoreError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(collection)?)
            .map_err(|e| io_error("open collection log", e))
    }

    fn replay(&self, collection: &str, path: &Path) -> Result<(), StoreError> {
        let bytes = fs::read(path).map_err(|e| io_error("read collection log", e))?;

        let mut valid_len = 0usize;
        let mut loaded = 0usize;
        for line in bytes.split_inclusive(|b| *b == b'\n') {
            // An unterminated or unparsable line ends the log.
            let Some(body) = line.strip_suffix(b"\n") else {
                break;
            };
            let Ok(document) = serde_json::from_slice::<Document>(body) else {
                break;
            };
            match self.documents.insert_one(collection, document) {
                Ok(()) => loaded += 1,
                Err(StoreError::DuplicateKey { .. }) => {}
                Err(err) => return Err(err),
            }
            valid_len += line.len();
        }

        if valid_len < bytes.len() {
            tracing::warn!(
                collection,
                dropped_bytes = bytes.len() - valid_len,
                "[history-sync] Truncating torn tail of collection log"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| io_error("open collection log", e))?;
            file.set_len(valid_len as u64)
                .map_err(|e| io_error("truncate collection log", e))?;
        }

        tracing::info!(
            collection,
            documents = loaded,
            path = %path.display(),
            "[history-sync] Loaded collection log"
        );
        Ok(())
    }
}

impl DocumentStore for FileDocumentStore {
    fn create_index(&self, collection: &str, path: &str) -> Result<(), StoreError> {
        self.documents.create_index(collection, path)
    }

    fn find_by_id(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError> {
        self.documents.find_by_id(collection, id)
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let id = document
            .get(ID_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::InvalidDocument {
                message: format!("missing integer {ID_FIELD}"),
            })?;

        let mut logs = self.logs.lock();
        if self.documents.find_by_id(collection, id)?.is_some() {
            return Err(StoreError::DuplicateKey { id });
        }

        let mut line = serde_json::to_vec(&document).map_err(|e| StoreError::InvalidDocument {
            message: e.to_string(),
        })?;
        line.push(b'\n');

        let log = match logs.entry(collection.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.open_log(collection)?),
        };
        let offset = log
            .metadata()
            .map_err(|e| io_error("stat collection log", e))?
            .len();
        if let Err(err) = log.write_all(&line).and_then(|()| log.sync_data()) {
            // Cut a partial line so the next append starts on a clean line.
            let _ = log.set_len(offset);
            logs.remove(collection);
            return Err(io_error("append document", err));
        }

        self.documents.insert_one(collection, document)
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.documents.find(collection, filter, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::SortOrder;
    use serde_json::json;
    use tempfile::TempDir;

    const COLLECTION: &str = "action_traces";

    fn doc(id: i64, contract: &str) -> Document {
        json!({ "_id": id, "action": { "act": { "contractId": contract } } })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_documents_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileDocumentStore::open(temp_dir.path()).unwrap();
            for id in [3, 1, 2] {
                store.insert_one(COLLECTION, doc(id, "1.2.5")).unwrap();
            }
        }

        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.ids(COLLECTION), vec![1, 2, 3]);
        assert_eq!(
            store.find_by_id(COLLECTION, 2).unwrap(),
            Some(doc(2, "1.2.5"))
        );
    }

    #[test]
    fn test_insert_is_insert_if_absent_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        store.insert_one(COLLECTION, doc(1, "1.2.5")).unwrap();
        drop(store);

        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        assert_eq!(
            store.insert_one(COLLECTION, doc(1, "1.2.9")),
            Err(StoreError::DuplicateKey { id: 1 })
        );
        assert_eq!(store.len(COLLECTION), 1);

        let log = fs::read_to_string(store.log_path(COLLECTION).unwrap()).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn test_find_sorted_by_id_with_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        for (id, contract) in [(4, "1.2.5"), (1, "1.2.5"), (2, "1.2.6"), (3, "1.2.5")] {
            store.insert_one(COLLECTION, doc(id, contract)).unwrap();
        }
        store
            .create_index(COLLECTION, "action.act.contractId")
            .unwrap();

        let options = FindOptions {
            limit: Some(2),
            sort: SortOrder::Descending,
            exclude: vec![],
        };
        let found = store
            .find(
                COLLECTION,
                &Filter::eq("action.act.contractId", "1.2.5"),
                &options,
            )
            .unwrap();
        let ids: Vec<i64> = found.iter().filter_map(|d| d["_id"].as_i64()).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_torn_tail_is_dropped_and_log_stays_appendable() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        store.insert_one(COLLECTION, doc(1, "1.2.5")).unwrap();
        let path = store.log_path(COLLECTION).unwrap();
        drop(store);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"_id":2,"act"#).unwrap();
        drop(file);

        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.ids(COLLECTION), vec![1]);
        store.insert_one(COLLECTION, doc(2, "1.2.5")).unwrap();
        drop(store);

        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.ids(COLLECTION), vec![1, 2]);
    }

    #[test]
    fn test_document_without_id_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        let document = json!({ "action": {} }).as_object().cloned().unwrap();
        assert!(matches!(
            store.insert_one(COLLECTION, document),
            Err(StoreError::InvalidDocument { .. })
        ));
        assert!(!store.log_path(COLLECTION).unwrap().exists());
    }

    #[test]
    fn test_collection_name_must_be_a_file_name() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDocumentStore::open(temp_dir.path()).unwrap();
        assert!(store.log_path("../escape").is_err());
        assert!(store.log_path("").is_err());
        assert!(matches!(
            store.insert_one("a/b", doc(1, "1.2.5")),
            Err(StoreError::InvalidDocument { .. })
        ));
    }
}
