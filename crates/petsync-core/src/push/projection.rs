//! Outbox entry → wire operation projection.

use serde_json::{Map, Value};

use crate::models::{Op, OpKind, OpType, OutboxEntry, PetAttribute, PATIENT_KEY};
use crate::util::{is_blank, parse_weight};

/// Text attributes copied only when non-blank, with the nested key to fall
/// back on when the flat one is missing.
const TEXT_FIELDS: [(&str, Option<&str>); 7] = [
    ("name", Some("petName")),
    ("species", Some("species")),
    ("breed", Some("breed")),
    ("sex", Some("sex")),
    ("birth_date", Some("birthDate")),
    ("color", None),
    ("microchip", None),
];

/// Collections sent as-is, empty ones included. Each target key lists the
/// payload keys it may be read from.
const COLLECTIONS: [(&str, &[&str]); 5] = [
    ("notes", &["notes"]),
    ("vitals", &["vitals", "vitalsData"]),
    ("medications", &["medications"]),
    ("history", &["history"]),
    ("photos", &["photos"]),
];

const UPDATED_AT_KEYS: [&str; 2] = ["updated_at", "updatedAt"];
const VERSION_KEYS: [&str; 2] = ["base_version", "version"];

/// Build the wire op for a queued entry. `op_id` is the entry's persisted
/// idempotency key.
pub fn to_op(entry: &OutboxEntry, op_id: &str, client_ts: i64) -> Op {
    let source = flatten_payload(&entry.payload);
    let base_version = VERSION_KEYS
        .iter()
        .find_map(|key| source.get(*key).and_then(Value::as_i64));

    let (kind, patch) = match entry.op_type {
        OpType::Delete => (OpKind::Delete, None),
        OpType::Create | OpType::Update => (OpKind::Upsert, Some(project_patch(&source))),
    };

    Op {
        op_id: op_id.to_string(),
        kind,
        pet_id: entry.pet_local_id.clone(),
        base_version,
        patch,
        client_ts,
    }
}

/// Payload fields with any `patch` object laid over the top level
fn flatten_payload(payload: &Map<String, Value>) -> Map<String, Value> {
    let mut source = payload.clone();
    if let Some(Value::Object(patch)) = source.remove("patch") {
        source.extend(patch);
    }
    source
}

/// Project a flattened payload onto the fields the server accepts
pub fn project_patch(source: &Map<String, Value>) -> Map<String, Value> {
    let nested = source.get(PATIENT_KEY).and_then(Value::as_object);
    let mut patch = Map::new();

    for (key, nested_key) in TEXT_FIELDS {
        let value = [source.get(key), nested_value(nested, nested_key)]
            .into_iter()
            .flatten()
            .find(|value| value.is_string() && !is_blank(Some(*value)));
        if let Some(Value::String(text)) = value {
            patch.insert(key.to_string(), Value::String(text.trim().to_string()));
        }
    }

    let weight_key = PetAttribute::Weight.flat_key();
    let weight = [
        source.get(weight_key),
        nested_value(nested, Some(PetAttribute::Weight.nested_key())),
    ]
        .into_iter()
        .flatten()
        .find_map(parse_weight);
    if let Some(weight) = weight {
        patch.insert(weight_key.to_string(), Value::from(weight));
    }

    for (target, keys) in COLLECTIONS {
        let value = keys
            .iter()
            .find_map(|key| source.get(*key).filter(|value| !value.is_null()));
        if let Some(value) = value {
            patch.insert(target.to_string(), value.clone());
        }
    }

    let updated_at = UPDATED_AT_KEYS
        .iter()
        .find_map(|key| source.get(*key).filter(|value| !is_blank(Some(*value))));
    if let Some(updated_at) = updated_at {
        patch.insert("updated_at".to_string(), updated_at.clone());
    }

    patch
}

fn nested_value<'a>(nested: Option<&'a Map<String, Value>>, key: Option<&str>) -> Option<&'a Value> {
    nested.zip(key).and_then(|(nested, key)| nested.get(key))
}
