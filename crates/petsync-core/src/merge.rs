//! Non-destructive merge of a normalized remote record into local state.
//!
//! Remote values only win when they are defined; a field the server omitted
//! (or sent as `null`) never erases what the device already knows.

use serde_json::{Map, Value};

use crate::models::{PetAttribute, PetRecord, ID_KEYS, PATIENT_KEY};
use crate::util::{is_blank, is_defined};

/// Fold `remote` into a copy of `local`.
pub fn merge(local: &PetRecord, remote: &PetRecord) -> PetRecord {
    let mut merged = local.clone();

    for (key, value) in remote.as_map() {
        if ID_KEYS.contains(&key.as_str()) {
            if is_blank(merged.get(key)) && !is_blank(Some(value)) {
                merged.set(key.clone(), value.clone());
            }
            continue;
        }
        if key == PATIENT_KEY {
            if let Value::Object(remote_patient) = value {
                merge_patient(&mut merged, remote_patient);
            }
            continue;
        }
        if is_defined(Some(value)) {
            merged.set(key.clone(), value.clone());
        }
    }

    align_names(&mut merged, remote);
    merged
}

/// Nested fields follow the same defined-wins rule; blank strings are the
/// shape normalizer's placeholder and never overwrite a local value.
fn merge_patient(merged: &mut PetRecord, remote_patient: &Map<String, Value>) {
    for (key, value) in remote_patient {
        if is_defined(Some(value)) && !is_blank_text(value) {
            merged.set_patient_field(key.clone(), value.clone());
        }
    }
}

fn is_blank_text(value: &Value) -> bool {
    value.as_str().is_some_and(|text| text.trim().is_empty())
}

/// Keep top-level `name` and `patient.petName` identical.
fn align_names(merged: &mut PetRecord, remote: &PetRecord) {
    let flat_key = PetAttribute::Name.flat_key();
    let nested_key = PetAttribute::Name.nested_key();

    let top = merged.get(flat_key).cloned();
    let nested = merged
        .patient()
        .and_then(|patient| patient.get(nested_key))
        .cloned();

    match (is_blank(top.as_ref()), is_blank(nested.as_ref())) {
        (true, false) => {
            if let Some(nested) = nested {
                merged.set(flat_key, nested);
            }
        }
        (false, true) => {
            if let Some(top) = top {
                merged.set_patient_field(nested_key, top);
            }
        }
        (false, false) if top != nested => {
            let remote_nested = remote
                .patient()
                .and_then(|patient| patient.get(nested_key));
            let remote_sent_nested = !is_blank(remote_nested);
            let remote_sent_top = !is_blank(remote.get(flat_key));
            if remote_sent_nested || !remote_sent_top {
                if let Some(nested) = nested {
                    merged.set(flat_key, nested);
                }
            } else if let Some(top) = top {
                merged.set_patient_field(nested_key, top);
            }
        }
        _ => {}
    }
}
