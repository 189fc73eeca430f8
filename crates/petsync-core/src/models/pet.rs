//! Pet record model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

const TEMPORARY_ID_PREFIX: &str = "tmp_";

/// Keys a record may carry its identity under, in lookup order.
pub const ID_KEYS: [&str; 2] = ["id", "server_id"];

/// Key of the nested patient sub-object.
pub const PATIENT_KEY: &str = "patient";

/// Identifier of a pet: either a client-generated temporary id (`tmp_…`) or
/// a server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PetId(String);

impl PetId {
    /// Create a new temporary id for a record the server has not seen yet
    #[must_use]
    pub fn new_temporary() -> Self {
        Self(format!("{TEMPORARY_ID_PREFIX}{}", Uuid::now_v7().simple()))
    }

    /// Whether this id was generated locally and still awaits a server id
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl FromStr for PetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("pet id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Read an id out of a JSON value; strings must be non-blank, numbers are
/// rendered in decimal.
pub fn id_from_value(value: &Value) -> Option<PetId> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(PetId(text.trim().to_string())),
        Value::Number(number) => Some(PetId(number.to_string())),
        _ => None,
    }
}

/// Attributes that exist both flat on the record and inside `patient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetAttribute {
    Name,
    Species,
    Breed,
    Sex,
    Weight,
}

impl PetAttribute {
    pub const ALL: [Self; 5] = [
        Self::Name,
        Self::Species,
        Self::Breed,
        Self::Sex,
        Self::Weight,
    ];

    /// Key on the top-level record
    pub const fn flat_key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Species => "species",
            Self::Breed => "breed",
            Self::Sex => "sex",
            Self::Weight => "weight",
        }
    }

    /// Key inside the nested patient sub-object
    pub const fn nested_key(self) -> &'static str {
        match self {
            Self::Name => "petName",
            Self::Species => "species",
            Self::Breed => "breed",
            Self::Sex => "sex",
            Self::Weight => "weight",
        }
    }
}

/// A pet record as exchanged with the server.
///
/// Server payloads vary in shape, so the record is kept as a JSON object
/// with typed accessors for the fields sync logic depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PetRecord(Map<String, Value>);

impl PetRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record carrying only an id
    #[must_use]
    pub fn with_id(id: &PetId) -> Self {
        let mut record = Self::new();
        record.set("id", Value::String(id.to_string()));
        record
    }

    pub const fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build a record from a JSON value; anything but an object yields `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// First usable id among [`ID_KEYS`]
    pub fn id(&self) -> Option<PetId> {
        ID_KEYS
            .iter()
            .find_map(|key| self.0.get(*key).and_then(id_from_value))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Nested patient sub-object, if the record carries one
    pub fn patient(&self) -> Option<&Map<String, Value>> {
        self.0.get(PATIENT_KEY).and_then(Value::as_object)
    }

    /// Set a field on the nested patient, replacing a non-object `patient`
    pub fn set_patient_field(&mut self, key: impl Into<String>, value: Value) {
        match self.0.get_mut(PATIENT_KEY) {
            Some(Value::Object(patient)) => {
                patient.insert(key.into(), value);
            }
            _ => {
                let mut patient = Map::new();
                patient.insert(key.into(), value);
                self.0.insert(PATIENT_KEY.into(), Value::Object(patient));
            }
        }
    }

    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn temporary_ids_are_tagged_and_unique() {
        let first = PetId::new_temporary();
        let second = PetId::new_temporary();
        assert!(first.is_temporary());
        assert_ne!(first, second);
        assert!(!PetId::from("8d7f3a4e-5b0c-4c0e-9d7a-0f1e2d3c4b5a").is_temporary());
    }

    #[test]
    fn parse_rejects_blank_ids() {
        assert!("  ".parse::<PetId>().is_err());
        assert_eq!("p1".parse::<PetId>().unwrap(), PetId::from("p1"));
    }

    #[test]
    fn record_id_falls_back_to_server_id() {
        let record = PetRecord::from_value(json!({"id": " ", "server_id": "srv-1"})).unwrap();
        assert_eq!(record.id(), Some(PetId::from("srv-1")));

        let numeric = PetRecord::from_value(json!({"id": 42})).unwrap();
        assert_eq!(numeric.id(), Some(PetId::from("42")));
    }

    #[test]
    fn set_patient_field_replaces_non_object_values() {
        let mut record = PetRecord::from_value(json!({"patient": "oops"})).unwrap();
        record.set_patient_field("petName", json!("Rex"));
        assert_eq!(record.into_value(), json!({"patient": {"petName": "Rex"}}));
    }

    #[test]
    fn set_patient_field_keeps_existing_nested_fields() {
        let mut record = PetRecord::new();
        record.set_patient_field("breed", json!("Beagle"));
        record.set_patient_field("petName", json!("Rex"));
        assert_eq!(
            record.into_value(),
            json!({"patient": {"breed": "Beagle", "petName": "Rex"}})
        );
    }

    #[test]
    fn non_object_values_are_not_records() {
        assert!(PetRecord::from_value(json!([1, 2])).is_none());
        assert!(PetRecord::from_value(json!("p1")).is_none());
    }
}
