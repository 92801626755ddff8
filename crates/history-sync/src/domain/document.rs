//! # Stored Document Model
//!
//! Shape of the documents written to the `action_traces` collection and the
//! query vocabulary understood by the document store port.
//!
//! ```text
//! { "_id": <storage id>,
//!   "action": { ...record in stored vocabulary...,
//!               "act": { "contractId", "methodName", "data", "args"? },
//!               "inlineActions": [ { "act": {...}, "inlineActions": [...] } ],
//!               "resultArgs"? } }
//! ```

use crate::domain::errors::DocumentError;
use crate::domain::field_map::{MapDirection, ACTION_FIELD_MAP};
use serde_json::{Map, Value};
use shared_types::{ActionHistoryRecord, StorageId};

/// A JSON object as held by the document store.
pub type Document = Map<String, Value>;

/// Primary key field.
pub const ID_FIELD: &str = "_id";
/// Sub-document holding the rendered record.
pub const ACTION_FIELD: &str = "action";
/// Action call object inside a record or inline action.
pub const ACT_FIELD: &str = "act";
/// Nested inline actions.
pub const INLINE_ACTIONS_FIELD: &str = "inlineActions";
/// Decoded call arguments, present when the schema resolved.
pub const ARGS_FIELD: &str = "args";
/// Decoded return value, present when the schema declares one.
pub const RESULT_ARGS_FIELD: &str = "resultArgs";

/// Store key for a storage id. The store keeps signed 64-bit integers.
pub fn storage_key(storage_id: StorageId) -> i64 {
    storage_id as i64
}

// =============================================================================
// QUERY VOCABULARY
// =============================================================================

/// Document filter understood by every store adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Match everything.
    All,
    /// Dotted `path` equals `value`.
    Eq { path: String, value: Value },
    /// Any branch matches.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq { path, value } => lookup_path(document, path) == Some(value),
            Self::Or(branches) => branches.iter().any(|f| f.matches(document)),
        }
    }
}

/// Sort on `_id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Find options: limit, sort and an exclusion projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// `None` returns every match.
    pub limit: Option<usize>,
    pub sort: SortOrder,
    /// Dotted paths removed from every returned document.
    pub exclude: Vec<String>,
}

/// Resolve a dotted path (`action.act.contractId`) inside a document.
pub fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Remove a dotted path from a document; missing paths are ignored.
pub fn remove_path(document: &mut Document, path: &str) {
    match path.rsplit_once('.') {
        None => {
            document.remove(path);
        }
        Some((parent, leaf)) => {
            let mut current = document;
            for segment in parent.split('.') {
                match current.get_mut(segment).and_then(Value::as_object_mut) {
                    Some(next) => current = next,
                    None => return,
                }
            }
            current.remove(leaf);
        }
    }
}

// =============================================================================
// WRITE SIDE
// =============================================================================

/// What the worker writes for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistableAction {
    /// Fully rendered record in stored vocabulary.
    Full { id: i64, action: Document },
    /// Rendering failed; only the storage key is kept.
    IdentityOnly { id: i64 },
}

impl PersistableAction {
    pub fn id(&self) -> i64 {
        match self {
            Self::Full { id, .. } | Self::IdentityOnly { id } => *id,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::IdentityOnly { .. })
    }

    /// Final document, `_id` first.
    pub fn into_document(self) -> Document {
        let mut document = Document::new();
        match self {
            Self::Full { id, action } => {
                document.insert(ID_FIELD.to_string(), Value::from(id));
                document.insert(ACTION_FIELD.to_string(), Value::Object(action));
            }
            Self::IdentityOnly { id } => {
                document.insert(ID_FIELD.to_string(), Value::from(id));
            }
        }
        document
    }
}

/// Apply the action field map to a record body and every nested inline action.
pub fn map_action_fields(
    body: &mut Document,
    direction: MapDirection,
) -> Result<(), DocumentError> {
    if let Some(act) = body.get_mut(ACT_FIELD).and_then(Value::as_object_mut) {
        ACTION_FIELD_MAP.apply(act, direction)?;
    }
    if let Some(inline) = body
        .get_mut(INLINE_ACTIONS_FIELD)
        .and_then(Value::as_array_mut)
    {
        for nested in inline.iter_mut().filter_map(Value::as_object_mut) {
            map_action_fields(nested, direction)?;
        }
    }
    Ok(())
}

// =============================================================================
// READ SIDE
// =============================================================================

/// Rebuild a record from a stored document.
///
/// The document's `action` body is reverse-mapped into schema vocabulary and
/// deserialized. Decoded `args`/`resultArgs` are ignored; the raw payloads
/// are authoritative.
pub fn record_from_document(mut document: Document) -> Result<ActionHistoryRecord, DocumentError> {
    let id = document.get(ID_FIELD).and_then(Value::as_i64);

    let mut body = match document.remove(ACTION_FIELD) {
        Some(Value::Object(body)) => body,
        _ => return Err(DocumentError::MissingAction { id }),
    };

    map_action_fields(&mut body, MapDirection::ToSchema)?;

    let act = body
        .get(ACT_FIELD)
        .and_then(Value::as_object)
        .ok_or(DocumentError::MissingIdentifier { id, field: "act" })?;
    for field in ["account", "name"] {
        if !act.contains_key(field) {
            return Err(DocumentError::MissingIdentifier { id, field });
        }
    }

    serde_json::from_value(Value::Object(body)).map_err(|e| DocumentError::InvalidShape {
        id,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn stored_document() -> Document {
        doc(json!({
            "_id": 5,
            "action": {
                "storageId": 5,
                "blockNum": 10,
                "trxInBlock": 0,
                "opInTrx": 2,
                "sender": "1.2.17",
                "receiver": "1.2.22",
                "act": { "contractId": "1.2.22", "methodName": "hi", "data": "0102" },
                "inlineActions": [{
                    "sender": "1.2.22",
                    "receiver": "1.2.23",
                    "act": { "contractId": "1.2.23", "methodName": "log", "data": "" },
                    "inlineActions": []
                }],
                "result": "",
                "txid": "aa",
                "irreversibleState": true
            }
        }))
    }

    #[test]
    fn test_lookup_and_remove_path() {
        let mut document = stored_document();
        assert_eq!(
            lookup_path(&document, "action.act.contractId"),
            Some(&json!("1.2.22"))
        );
        assert_eq!(lookup_path(&document, "action.nope.x"), None);

        remove_path(&mut document, "action.act.data");
        assert_eq!(lookup_path(&document, "action.act.data"), None);
        remove_path(&mut document, "action.missing.leaf");
        remove_path(&mut document, "_id");
        assert!(!document.contains_key("_id"));
    }

    #[test]
    fn test_filter_matches() {
        let document = stored_document();
        assert!(Filter::All.matches(&document));
        assert!(Filter::eq("action.txid", "aa").matches(&document));
        assert!(!Filter::eq("action.txid", "bb").matches(&document));
        assert!(Filter::Or(vec![
            Filter::eq("action.act.contractId", "1.2.1"),
            Filter::eq("action.act.contractId", "1.2.22"),
        ])
        .matches(&document));
    }

    #[test]
    fn test_record_from_document_reverses_nested_names() {
        let record = record_from_document(stored_document()).unwrap();
        assert_eq!(record.storage_id, 5);
        assert_eq!(record.act.method_name, "hi");
        assert_eq!(record.act.data, vec![1, 2]);
        assert_eq!(record.inline_actions[0].act.method_name, "log");
        assert_eq!(record.inline_actions[0].receiver.instance(), 23);
    }

    #[test]
    fn test_identity_only_document_is_malformed() {
        let document = PersistableAction::IdentityOnly { id: 8 }.into_document();
        assert_eq!(
            record_from_document(document),
            Err(DocumentError::MissingAction { id: Some(8) })
        );
    }

    #[test]
    fn test_missing_identifier_is_reported() {
        let mut document = stored_document();
        remove_path(&mut document, "action.act.methodName");
        assert_eq!(
            record_from_document(document),
            Err(DocumentError::MissingIdentifier {
                id: Some(5),
                field: "name"
            })
        );
    }

    #[test]
    fn test_bad_account_string_is_invalid_shape() {
        let mut document = stored_document();
        document["action"]["sender"] = json!("not-an-account");
        assert!(matches!(
            record_from_document(document),
            Err(DocumentError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_storage_key_is_signed_cast() {
        assert_eq!(storage_key(42), 42);
        assert_eq!(storage_key(u64::MAX), -1);
    }
}
