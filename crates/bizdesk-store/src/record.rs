//! Loosely typed entity records.
//!
//! The document store has no fixed schema. A [`Record`] is a key/value map;
//! the engine only relies on `id`, `created_date`, the tenant field and
//! whichever foreign-key fields the relationship registry declares.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// Field holding a record's primary key.
pub const ID_FIELD: &str = "id";

/// Field holding a record's creation timestamp.
pub const CREATED_DATE_FIELD: &str = "created_date";

/// Field partitioning records by tenant (organisation).
pub const TENANT_FIELD: &str = "organisation_id";

/// Partial field set used for updates.
pub type Fields = Map<String, Value>;

/// A single entity record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Fields,
}

impl Record {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self {
            fields: Map::new(),
        }
    }

    /// Wrap an existing field map.
    pub fn from_fields(fields: Fields) -> Self {
        Self { fields }
    }

    /// Build a record from a JSON value, which must be an object.
    pub fn from_json(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(StoreError::InvalidData {
                message: format!("record must be a JSON object, got {other}"),
            }),
        }
    }

    /// Set a field using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a raw field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The record's primary key, if present and non-empty.
    pub fn id(&self) -> Option<String> {
        self.reference(ID_FIELD)
    }

    /// The tenant this record belongs to.
    pub fn tenant(&self) -> Option<String> {
        self.reference(TENANT_FIELD)
    }

    /// The `created_date` value as stored.
    pub fn created_date(&self) -> Option<&str> {
        self.get(CREATED_DATE_FIELD).and_then(Value::as_str)
    }

    /// Read a field as a reference (foreign key) value.
    ///
    /// Strings are trimmed; numbers are rendered in decimal. `null`, missing
    /// fields, blank strings and any other JSON type yield `None`: an unset
    /// relationship is not a reference.
    pub fn reference(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Read a field as a number. Numeric strings are accepted.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// First non-blank string among `candidates`, for operator display.
    pub fn label(&self, candidates: &[String]) -> Option<String> {
        candidates.iter().find_map(|field| {
            self.get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        })
    }

    /// Apply a partial update, overwriting the given fields.
    pub fn merge(&mut self, patch: &Fields) {
        for (name, value) in patch {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// Borrow the underlying field map.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Convert into a JSON value.
    pub fn into_json(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}
