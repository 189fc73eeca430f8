//! Field-shape normalization.
//!
//! The server may describe a pet with flat attributes (`name`, `breed`, …),
//! with a nested `patient` object (`petName`, `breed`, …), or both. Every
//! record is rewritten so both shapes carry the same values.

use serde_json::{Map, Value};

use crate::models::{PetAttribute, PetRecord, PATIENT_KEY};
use crate::util::{is_blank, is_defined};

/// Build a record whose flat and nested attributes agree.
///
/// Nested values win when defined, flat values fill the gaps, and an
/// attribute missing from both shapes becomes an empty string in `patient`.
pub fn normalize_record_shape(raw: &Value) -> PetRecord {
    let Some(mut record) = PetRecord::from_value(raw.clone()) else {
        return PetRecord::new();
    };

    let original_nested = record.patient().cloned().unwrap_or_default();
    let mut nested: Map<String, Value> = original_nested.clone();

    for attribute in PetAttribute::ALL {
        let nested_value = original_nested
            .get(attribute.nested_key())
            .filter(|value| !value.is_null());
        let flat_value = record
            .get(attribute.flat_key())
            .filter(|value| !value.is_null());
        let chosen = nested_value
            .or(flat_value)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        nested.insert(attribute.nested_key().to_string(), chosen);
    }

    for attribute in PetAttribute::ALL {
        let flat = record.get(attribute.flat_key()).cloned();
        let nested_value = nested.get(attribute.nested_key()).cloned();

        if !is_defined(flat.as_ref()) {
            if let Some(value) = nested_value.filter(|value| !is_blank(Some(value))) {
                record.set(attribute.flat_key(), value);
            }
        } else if is_blank(nested_value.as_ref()) {
            if let Some(value) = flat.filter(|value| !is_blank(Some(value))) {
                nested.insert(attribute.nested_key().to_string(), value);
            }
        }
    }

    record.set(PATIENT_KEY, Value::Object(nested));
    record
}
