//! # In-Memory Document Store
//!
//! `DocumentStore` over `BTreeMap`s keyed by `_id`, with optional secondary
//! indexes on dotted paths. Used by tests and as the live view behind
//! `FileDocumentStore`.

use crate::domain::document::{
    lookup_path, remove_path, Document, Filter, FindOptions, SortOrder, ID_FIELD,
};
use crate::ports::outbound::{DocumentStore, StoreError};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Index entries: rendered value → ids.
type PathIndex = HashMap<String, BTreeSet<i64>>;

#[derive(Default)]
struct Collection {
    documents: BTreeMap<i64, Document>,
    indexes: HashMap<String, PathIndex>,
}

impl Collection {
    fn index_document(index: &mut PathIndex, path: &str, id: i64, document: &Document) {
        if let Some(value) = lookup_path(document, path) {
            index.entry(value.to_string()).or_default().insert(id);
        }
    }

    /// Ids that may match `filter`; `None` means a full scan is needed.
    fn candidates(&self, filter: &Filter) -> Option<BTreeSet<i64>> {
        match filter {
            Filter::All => None,
            Filter::Eq { path, value } => {
                let index = self.indexes.get(path)?;
                Some(index.get(&value.to_string()).cloned().unwrap_or_default())
            }
            Filter::Or(branches) => {
                let mut ids = BTreeSet::new();
                for branch in branches {
                    ids.extend(self.candidates(branch)?);
                }
                Some(ids)
            }
        }
    }
}

/// Thread-safe in-memory document store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Raw stored document, without projection.
    pub fn get(&self, collection: &str, id: i64) -> Option<Document> {
        self.collections
            .read()
            .get(collection)
            .and_then(|c| c.documents.get(&id).cloned())
    }

    /// All `_id`s of a collection in ascending order.
    pub fn ids(&self, collection: &str) -> Vec<i64> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Indexed paths of a collection.
    pub fn indexes(&self, collection: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .collections
            .read()
            .get(collection)
            .map(|c| c.indexes.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn create_index(&self, collection: &str, path: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let collection = collections.entry(collection.to_string()).or_default();
        if collection.indexes.contains_key(path) {
            return Ok(());
        }

        let mut index = PathIndex::new();
        for (id, document) in &collection.documents {
            Collection::index_document(&mut index, path, *id, document);
        }
        collection.indexes.insert(path.to_string(), index);
        Ok(())
    }

    fn find_by_id(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError> {
        Ok(self.get(collection, id))
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let id = document
            .get(ID_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::InvalidDocument {
                message: format!("missing integer {ID_FIELD}"),
            })?;

        let mut collections = self.collections.write();
        let collection = collections.entry(collection.to_string()).or_default();
        if collection.documents.contains_key(&id) {
            return Err(StoreError::DuplicateKey { id });
        }

        for (path, index) in collection.indexes.iter_mut() {
            Collection::index_document(index, path, id, &document);
        }
        collection.documents.insert(id, document);
        Ok(())
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read();
        let Some(collection) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<(&i64, &Document)> = match collection.candidates(filter) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| collection.documents.get_key_value(id))
                .filter(|(_, document)| filter.matches(document))
                .collect(),
            None => collection
                .documents
                .iter()
                .filter(|(_, document)| filter.matches(document))
                .collect(),
        };

        if options.sort == SortOrder::Descending {
            matches.reverse();
        }
        if let Some(limit) = options.limit {
            matches.truncate(limit);
        }

        Ok(matches
            .into_iter()
            .map(|(_, document)| {
                let mut document = document.clone();
                for path in &options.exclude {
                    remove_path(&mut document, path);
                }
                document
            })
            .collect())
    }
}
