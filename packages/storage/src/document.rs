// ABOUTME: Loosely-typed documents as they cross the store boundary
// ABOUTME: Decoding into typed records happens here and nowhere else

use caseflow_core::{fields, Collection, Entity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{StorageError, StorageResult};

/// A stored record: its id plus the raw field map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Encode a typed record
    pub fn from_entity<T: Entity>(entity: &T) -> StorageResult<Self> {
        match serde_json::to_value(entity)? {
            Value::Object(data) => Ok(Self::new(entity.id(), data)),
            other => Err(StorageError::Database(format!(
                "{} record serialized to {} instead of an object",
                T::COLLECTION,
                other
            ))),
        }
    }

    /// Decode into a typed record; the document id wins over any `id` field in the body
    pub fn decode<T: Entity>(&self) -> StorageResult<T> {
        let mut data = self.data.clone();
        data.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(data)).map_err(|source| StorageError::Decode {
            collection: T::COLLECTION,
            id: self.id.clone(),
            source,
        })
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.data.get(fields::TENANT_ID).and_then(Value::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Whether the named field is an array holding `value`
    pub fn array_contains(&self, name: &str, value: &Value) -> bool {
        self.field(name)
            .and_then(Value::as_array)
            .is_some_and(|items| items.contains(value))
    }

    /// Merge a patch over this document's top-level fields
    pub fn apply(&mut self, patch: &Patch) {
        for (field, value) in &patch.fields {
            self.data.insert(field.clone(), value.clone());
        }
    }
}

/// Address of one document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocRef {
    pub collection: Collection,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }

    pub fn not_found(&self) -> StorageError {
        StorageError::NotFound {
            collection: self.collection,
            id: self.id.clone(),
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Top-level field assignments merged into an existing document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    fields: Map<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Serialize) -> StorageResult<Self> {
        self.fields
            .insert(field.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One member of an all-or-nothing batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchUpdate {
    pub target: DocRef,
    pub patch: Patch,
}

impl BatchUpdate {
    pub fn new(target: DocRef, patch: Patch) -> Self {
        Self { target, patch }
    }
}

/// Pre- and post-write snapshots of one document write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange {
    pub collection: Collection,
    #[serde(default)]
    pub before: Option<Document>,
    #[serde(default)]
    pub after: Option<Document>,
}

impl DocumentChange {
    pub fn new(collection: Collection, before: Option<Document>, after: Option<Document>) -> Self {
        Self {
            collection,
            before,
            after,
        }
    }

    /// Neither snapshot exists (e.g. deleting a missing document)
    pub fn is_noop(&self) -> bool {
        self.before.is_none() && self.after.is_none()
    }
}
