//! Reconciles fresh agent output with the document already on disk.
//!
//! Array documents are append-only: a record is identified by its whole
//! structural value, records already present are dropped, and new ones are
//! appended in the order the agent returned them. Object documents are
//! replaced wholesale.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::schema::{Schema, SchemaMismatch, check_shape};

/// Contents of a job's target file, framed by the job's top-level schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Records(Vec<Value>),
    Object(Map<String, Value>),
}

impl Document {
    /// Frames `value` according to `schema`, rejecting the wrong container.
    pub fn from_value(value: Value, schema: &Schema) -> Result<Self, SchemaMismatch> {
        check_shape(schema, &value)?;
        match value {
            Value::Array(records) => Ok(Document::Records(records)),
            Value::Object(map) => Ok(Document::Object(map)),
            other => Err(SchemaMismatch {
                path: "$".to_string(),
                expected: "array or object".to_string(),
                actual: other.to_string(),
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Document::Records(records) => Value::Array(records.clone()),
            Document::Object(map) => Value::Object(map.clone()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Document::Records(records) => records.len(),
            Document::Object(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a merge: the document to persist and whether it differs.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub document: Document,
    pub changed: bool,
    /// Records appended by this merge, in order; always empty for objects.
    pub added: Vec<Value>,
}

impl Merged {
    pub fn records_added(&self) -> usize {
        self.added.len()
    }
}

/// Canonical identity of a record. `serde_json::Map` keeps keys sorted, so
/// two records with the same members compare equal regardless of key order.
pub fn record_key(record: &Value) -> String {
    record.to_string()
}

/// Merges `incoming` into `existing`. Pure: no validation and no I/O.
pub fn merge(existing: Option<Document>, incoming: Document) -> Merged {
    match (existing, incoming) {
        (None, Document::Records(incoming)) => append_records(Vec::new(), incoming),
        (Some(Document::Records(existing)), Document::Records(incoming)) => {
            append_records(existing, incoming)
        }
        (Some(Document::Object(existing)), Document::Object(incoming)) => {
            let changed = Value::Object(existing) != Value::Object(incoming.clone());
            Merged {
                document: Document::Object(incoming),
                changed,
                added: Vec::new(),
            }
        }
        // No prior object, or the prior file has the other framing.
        (_, incoming) => {
            let added = match &incoming {
                Document::Records(records) => records.clone(),
                Document::Object(_) => Vec::new(),
            };
            Merged {
                document: incoming,
                changed: true,
                added,
            }
        }
    }
}

fn append_records(mut existing: Vec<Value>, incoming: Vec<Value>) -> Merged {
    let mut seen: HashSet<String> = existing.iter().map(record_key).collect();
    let before = existing.len();
    for record in incoming {
        if seen.insert(record_key(&record)) {
            existing.push(record);
        }
    }
    let added = existing[before..].to_vec();
    Merged {
        changed: !added.is_empty(),
        document: Document::Records(existing),
        added,
    }
}
