//! # Field Mapping
//!
//! Bidirectional rename table between the schema library's generic
//! vocabulary and the stored document vocabulary.
//!
//! | Schema | Stored |
//! |--------|--------|
//! | `account` | `contractId` |
//! | `name` | `methodName` |
//! | `hexData` | `data` |
//!
//! The table must stay a bijection whose two sides are disjoint, otherwise
//! `reverse(forward(x)) == x` no longer holds.

use crate::domain::errors::DocumentError;
use serde_json::{Map, Value};

/// Direction of a rename pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapDirection {
    /// Schema names → stored names (write path).
    ToStored,
    /// Stored names → schema names (read path).
    ToSchema,
}

/// Ordered list of `(schema_name, stored_name)` pairs.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pairs: &'static [(&'static str, &'static str)],
}

/// Rename table applied to every action-call object.
pub const ACTION_FIELD_MAP: FieldMap = FieldMap::new(&[
    ("account", "contractId"),
    ("name", "methodName"),
    ("hexData", "data"),
]);

impl FieldMap {
    pub const fn new(pairs: &'static [(&'static str, &'static str)]) -> Self {
        Self { pairs }
    }

    /// Stored name for a schema field, if the field is mapped.
    pub fn stored_name(&self, schema_name: &str) -> Option<&'static str> {
        self.pairs
            .iter()
            .find(|(schema, _)| *schema == schema_name)
            .map(|(_, stored)| *stored)
    }

    /// Schema name for a stored field, if the field is mapped.
    pub fn schema_name(&self, stored_name: &str) -> Option<&'static str> {
        self.pairs
            .iter()
            .find(|(_, stored)| *stored == stored_name)
            .map(|(schema, _)| *schema)
    }

    /// True when every name appears once across both columns.
    pub fn is_bijective(&self) -> bool {
        let mut seen: Vec<&str> = Vec::with_capacity(self.pairs.len() * 2);
        for (schema, stored) in self.pairs {
            for name in [schema, stored] {
                if seen.contains(name) {
                    return false;
                }
                seen.push(*name);
            }
        }
        true
    }

    /// Rename the keys of a single object in place.
    ///
    /// Unmapped keys are left alone. Fails without modifying `object` if a
    /// rename target already exists as an unrelated key.
    pub fn apply(
        &self,
        object: &mut Map<String, Value>,
        direction: MapDirection,
    ) -> Result<(), DocumentError> {
        let renames: Vec<(&'static str, &'static str)> = self
            .pairs
            .iter()
            .map(|&(schema, stored)| match direction {
                MapDirection::ToStored => (schema, stored),
                MapDirection::ToSchema => (stored, schema),
            })
            .filter(|(from, _)| object.contains_key(*from))
            .collect();

        for (_, to) in &renames {
            let target_is_renamed_away = renames.iter().any(|(from, _)| from == to);
            if object.contains_key(*to) && !target_is_renamed_away {
                return Err(DocumentError::FieldCollision {
                    field: (*to).to_string(),
                });
            }
        }

        let moved: Vec<(&'static str, Value)> = renames
            .iter()
            .filter_map(|(from, to)| object.remove(*from).map(|value| (*to, value)))
            .collect();
        for (to, value) in moved {
            object.insert(to.to_string(), value);
        }
        Ok(())
    }
}
