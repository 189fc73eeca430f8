//! Pull response normalization.
//!
//! Servers answer a pull with one of several shapes. Each known shape is a
//! variant of [`PullResponse`], decoded in a fixed priority order, and every
//! shape reduces to the same [`NormalizedPull`].

use serde_json::{Map, Value};

use crate::models::{id_from_value, PetId, ID_KEYS};

/// Canonical result of a pull
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPull {
    pub upserts: Vec<Value>,
    pub deletes: Vec<PetId>,
    pub next_cursor: String,
}

/// Known pull response shapes, highest priority first
#[derive(Debug, Clone, PartialEq)]
pub enum PullResponse<'a> {
    /// A bare array of records, all upserts
    Records(&'a [Value]),
    /// `{ "pets": [...] }`
    Pets(&'a [Value], &'a Map<String, Value>),
    /// `{ "items": [...] }`
    Items(&'a [Value], &'a Map<String, Value>),
    /// `{ "changes": [...] }`
    Changes(&'a [Value], &'a Map<String, Value>),
    Unrecognized,
}

impl<'a> PullResponse<'a> {
    pub fn decode(response: &'a Value) -> Self {
        let object = match response {
            Value::Array(records) => return Self::Records(records),
            Value::Object(object) => object,
            _ => return Self::Unrecognized,
        };
        let list = |key: &str| object.get(key).and_then(Value::as_array);

        if let Some(pets) = list("pets") {
            Self::Pets(pets, object)
        } else if let Some(items) = list("items") {
            Self::Items(items, object)
        } else if let Some(changes) = list("changes") {
            Self::Changes(changes, object)
        } else {
            Self::Unrecognized
        }
    }
}

/// What a single entry of `changes` turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum PullChange {
    Upsert(Value),
    Delete(PetId),
}

impl PullChange {
    /// Classify a raw change; `None` when it is neither a usable delete nor
    /// an upsert.
    pub fn classify(change: &Value) -> Option<Self> {
        let change = change.as_object()?;
        let record = ["record", "patch"]
            .iter()
            .find_map(|key| change.get(*key).and_then(Value::as_object));
        let id = change
            .get("pet_id")
            .and_then(id_from_value)
            .or_else(|| {
                record.and_then(|record| {
                    ID_KEYS
                        .iter()
                        .find_map(|key| record.get(*key).and_then(id_from_value))
                })
            })
            .or_else(|| change.get("id").and_then(id_from_value));
        let kind = change_kind(change.get("type"));

        if kind == "delete" || (kind.is_empty() && record.is_none()) {
            return id.map(Self::Delete);
        }

        let explicit_upsert = matches!(kind.as_str(), "upsert" | "create" | "update");
        if !explicit_upsert && record.is_none() {
            return None;
        }
        if record.is_none() && id.is_none() {
            return None;
        }

        let mut record = record.cloned().unwrap_or_default();
        if let Some(id) = id {
            let has_id = record.get("id").and_then(id_from_value).is_some();
            if !has_id {
                record.insert("id".into(), Value::String(id.to_string()));
            }
        }
        Some(Self::Upsert(Value::Object(record)))
    }
}

/// Lowercased trailing segment of a change type: `pet.delete` → `delete`.
fn change_kind(value: Option<&Value>) -> String {
    let Some(kind) = value.and_then(Value::as_str) else {
        return String::new();
    };
    kind.trim()
        .rsplit(['.', ':', '/'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn cursor_of(object: &Map<String, Value>) -> String {
    ["next_cursor", "cursor", "last_cursor"]
        .iter()
        .find_map(|key| match object.get(*key) {
            Some(Value::String(cursor)) if !cursor.is_empty() => Some(cursor.clone()),
            Some(Value::Number(cursor)) => Some(cursor.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn records_only(records: &[Value]) -> Vec<Value> {
    records.iter().filter(|record| record.is_object()).cloned().collect()
}

/// Reduce any supported pull response to upserts, deletes, and a cursor.
pub fn normalize_pull(response: &Value) -> NormalizedPull {
    match PullResponse::decode(response) {
        PullResponse::Records(records) => NormalizedPull {
            upserts: records_only(records),
            ..NormalizedPull::default()
        },
        PullResponse::Pets(records, object) | PullResponse::Items(records, object) => {
            NormalizedPull {
                upserts: records_only(records),
                deletes: Vec::new(),
                next_cursor: cursor_of(object),
            }
        }
        PullResponse::Changes(changes, object) => {
            let mut normalized = NormalizedPull {
                next_cursor: cursor_of(object),
                ..NormalizedPull::default()
            };
            for change in changes {
                match PullChange::classify(change) {
                    Some(PullChange::Upsert(record)) => normalized.upserts.push(record),
                    Some(PullChange::Delete(id)) => normalized.deletes.push(id),
                    None => tracing::debug!(?change, "Dropped unclassifiable pull change"),
                }
            }
            normalized
        }
        PullResponse::Unrecognized => {
            tracing::warn!("Pull response matched no known shape");
            NormalizedPull::default()
        }
    }
}
