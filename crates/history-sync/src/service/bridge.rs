//! # Schema Bridge
//!
//! Turns records into stored documents and back.
//!
//! ```text
//! record ──serde──→ JSON (schema vocabulary)
//!        ──decode act.hexData with receiver's ABI──→ act.args
//!        ──decode result with the method's result_type──→ resultArgs
//!        ──FieldMap::ToStored (act + every inline act)──→ stored body
//! ```
//!
//! Any schema failure degrades the record to an identity-only document;
//! the pipeline keeps going.

use crate::domain::abi::AbiSerializer;
use crate::domain::document::{
    map_action_fields, record_from_document, storage_key, Document, PersistableAction,
    ACT_FIELD, ARGS_FIELD, INLINE_ACTIONS_FIELD, RESULT_ARGS_FIELD,
};
use crate::domain::errors::{DocumentError, SchemaError};
use crate::domain::field_map::MapDirection;
use crate::ports::outbound::AbiProvider;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::{AccountId, ActionCall, ActionHistoryRecord, InlineAction};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cached lookup result; `None` means the account publishes no ABI.
type CachedSchema = Option<Arc<AbiSerializer>>;

pub struct SchemaBridge {
    provider: Arc<dyn AbiProvider>,
    cache: Mutex<LruCache<AccountId, CachedSchema>>,
}

impl SchemaBridge {
    pub fn new(provider: Arc<dyn AbiProvider>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Schema of `account`, served from the LRU cache when possible.
    ///
    /// Provider and parse failures are not cached.
    pub fn schema_for(&self, account: AccountId) -> Result<CachedSchema, SchemaError> {
        if let Some(cached) = self.cache.lock().get(&account) {
            return Ok(cached.clone());
        }

        let schema = match self.provider.account_abi(account)? {
            Some(json) => Some(Arc::new(AbiSerializer::from_json(&json)?)),
            None => None,
        };
        self.cache.lock().put(account, schema.clone());
        Ok(schema)
    }

    /// Drop the cached schema of an account (e.g. after a contract update).
    pub fn invalidate(&self, account: AccountId) -> bool {
        self.cache.lock().pop(&account).is_some()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Render a record for storage, degrading to identity-only on failure.
    pub fn to_persistable(&self, record: &ActionHistoryRecord) -> PersistableAction {
        let id = storage_key(record.storage_id);
        match self.render(record) {
            Ok(action) => PersistableAction::Full { id, action },
            Err(err) => {
                tracing::warn!(
                    storage_id = record.storage_id,
                    txid = %record.txid,
                    error = %err,
                    "[history-sync] Rendering failed, storing identity-only document"
                );
                PersistableAction::IdentityOnly { id }
            }
        }
    }

    /// Rebuild a record from a stored document.
    pub fn from_persisted(&self, document: Document) -> Result<ActionHistoryRecord, DocumentError> {
        record_from_document(document)
    }

    fn render(&self, record: &ActionHistoryRecord) -> Result<Document, SchemaError> {
        let mut body = match serde_json::to_value(record) {
            Ok(Value::Object(body)) => body,
            Ok(_) => {
                return Err(SchemaError::Render {
                    message: "record did not serialize to an object".to_string(),
                })
            }
            Err(e) => {
                return Err(SchemaError::Render {
                    message: e.to_string(),
                })
            }
        };

        self.attach_args(&mut body, record.receiver, &record.act, &record.inline_actions)?;

        if !record.result.is_empty() {
            if let Some(schema) = self.schema_for(record.receiver)? {
                if let Some(result) = schema.decode_result(&record.act.method_name, &record.result)? {
                    body.insert(RESULT_ARGS_FIELD.to_string(), result);
                }
            }
        }

        map_action_fields(&mut body, MapDirection::ToStored).map_err(|e| SchemaError::Render {
            message: e.to_string(),
        })?;
        Ok(body)
    }

    /// Decode `act` into `act.args` for this level and every inline level.
    fn attach_args(
        &self,
        body: &mut Document,
        receiver: AccountId,
        act: &ActionCall,
        inline_actions: &[InlineAction],
    ) -> Result<(), SchemaError> {
        if let Some(schema) = self.schema_for(receiver)? {
            if let Some(args) = schema.decode_action(&act.method_name, &act.data)? {
                if let Some(Value::Object(act_body)) = body.get_mut(ACT_FIELD) {
                    act_body.insert(ARGS_FIELD.to_string(), args);
                }
            }
        }

        if let Some(Value::Array(nested)) = body.get_mut(INLINE_ACTIONS_FIELD) {
            for (value, inline) in nested.iter_mut().zip(inline_actions) {
                if let Value::Object(nested_body) = value {
                    self.attach_args(
                        nested_body,
                        inline.receiver,
                        &inline.act,
                        &inline.inline_actions,
                    )?;
                }
            }
        }
        Ok(())
    }
}
