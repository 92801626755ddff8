//! Query service: store lookup plus reverse translation of every result.

use crate::domain::errors::QueryError;
use crate::domain::query::ActionHistoryQuery;
use crate::ports::inbound::ActionHistoryApi;
use crate::ports::outbound::DocumentStore;
use crate::service::bridge::SchemaBridge;
use shared_types::ActionHistoryRecord;
use std::sync::Arc;

pub struct QueryService {
    store: Arc<dyn DocumentStore>,
    bridge: Arc<SchemaBridge>,
    collection: String,
    max_limit: u32,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        bridge: Arc<SchemaBridge>,
        collection: impl Into<String>,
        max_limit: u32,
    ) -> Self {
        Self {
            store,
            bridge,
            collection: collection.into(),
            max_limit,
        }
    }
}

impl ActionHistoryApi for QueryService {
    fn query_action_history(
        &self,
        query: &ActionHistoryQuery,
    ) -> Result<Vec<ActionHistoryRecord>, QueryError> {
        let filter = query.filter();
        let options = query.find_options(self.max_limit);
        tracing::debug!(?filter, limit = ?options.limit, "[history-sync] Querying action history");

        let documents = self.store.find(&self.collection, &filter, &options)?;
        documents
            .into_iter()
            .map(|document| self.bridge.from_persisted(document).map_err(QueryError::from))
            .collect()
    }
}
