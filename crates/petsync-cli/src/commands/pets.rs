use std::path::Path;

use chrono::Utc;
use petsync_core::models::PetAttribute;
use petsync_core::outbox::{enqueue, latest_for_entity};
use petsync_core::records::RecordStore;
use petsync_core::util::parse_weight;
use petsync_core::{merge, normalize_record_shape, CoalesceAction, OpType, PetId, PetRecord};
use serde_json::{Map, Number, Value};

use crate::cli::PetFields;
use crate::commands::common::{
    format_pet_lines, open_database, pet_name, pet_to_list_item, resolve_pet, short_id,
};
use crate::error::CliError;

const RESERVED_KEYS: [&str; 3] = ["id", "server_id", "patient"];

pub async fn run_add(fields: PetFields, db_path: &Path) -> Result<(), CliError> {
    let patch = build_patch(&fields)?;
    if patch.is_empty() {
        return Err(CliError::NoChanges);
    }

    let db = open_database(db_path).await?;
    let records = db.records();
    let outbox = db.outbox();

    let id = PetId::new_temporary();
    let record = new_pet_record(&id, patch);
    records.put(&id, &record).await?;
    enqueue(&outbox, OpType::Create, record.clone().into_map(), &id).await?;

    println!("Added {} ({})", pet_name(&record), id);
    Ok(())
}

pub async fn run_update(query: &str, fields: PetFields, db_path: &Path) -> Result<(), CliError> {
    let patch = build_patch(&fields)?;
    if patch.is_empty() {
        return Err(CliError::NoChanges);
    }

    let db = open_database(db_path).await?;
    let records = db.records();
    let outbox = db.outbox();
    let (id, local) = resolve_pet(query, &records).await?;

    let updated = apply_patch(&local, &patch);
    records.put(&id, &updated).await?;

    // Updates replace each other in the outbox, so each one carries the whole record.
    let mut payload = updated.clone().into_map();
    if let Some(version) = local.get("version").filter(|version| version.is_i64()) {
        payload.insert("base_version".into(), version.clone());
    }
    payload.insert("patch".into(), Value::Object(patch));
    let action = enqueue(&outbox, OpType::Update, payload, &id).await?;

    println!("Updated {} ({}, {})", pet_name(&updated), short_id(&id), describe_action(&action));
    Ok(())
}

pub async fn run_delete(query: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let records = db.records();
    let outbox = db.outbox();
    let (id, local) = resolve_pet(query, &records).await?;

    records.delete(&id).await?;

    // A temporary pet with nothing queued was never sent; there is nothing to delete remotely.
    if id.is_temporary() && latest_for_entity(&outbox, &id).await?.is_none() {
        println!("Deleted {} ({}, local only)", pet_name(&local), short_id(&id));
        return Ok(());
    }

    let mut payload = Map::new();
    payload.insert("id".into(), Value::String(id.to_string()));
    if let Some(version) = local.get("version").filter(|version| version.is_i64()) {
        payload.insert("base_version".into(), version.clone());
    }
    let action = enqueue(&outbox, OpType::Delete, payload, &id).await?;

    println!("Deleted {} ({}, {})", pet_name(&local), short_id(&id), describe_action(&action));
    Ok(())
}

pub async fn run_list(json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let pets = db.records().list().await?;

    if json {
        let items = pets.iter().map(pet_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if pets.is_empty() {
        println!("No pets yet. Add one with `petsync add --name <NAME>`.");
        return Ok(());
    }
    for line in format_pet_lines(&pets) {
        println!("{line}");
    }
    Ok(())
}

/// Collect command-line fields into a flat patch
pub fn build_patch(fields: &PetFields) -> Result<Map<String, Value>, CliError> {
    let mut patch = Map::new();

    let text_fields = [
        (PetAttribute::Name, &fields.name),
        (PetAttribute::Species, &fields.species),
        (PetAttribute::Breed, &fields.breed),
        (PetAttribute::Sex, &fields.sex),
    ];
    for (attribute, value) in text_fields {
        if let Some(value) = value.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
            patch.insert(attribute.flat_key().into(), Value::String(value.to_string()));
        }
    }

    if let Some(raw) = fields.weight.as_deref() {
        let weight = parse_weight(&Value::String(raw.to_string()))
            .and_then(Number::from_f64)
            .ok_or_else(|| CliError::InvalidField(format!("weight '{raw}' is not a number")))?;
        patch.insert(PetAttribute::Weight.flat_key().into(), Value::Number(weight));
    }

    for assignment in &fields.extra {
        let (key, value) = parse_assignment(assignment)?;
        patch.insert(key, value);
    }

    Ok(patch)
}

/// Parse `KEY=VALUE`; VALUE is JSON when it parses, a string otherwise
pub fn parse_assignment(raw: &str) -> Result<(String, Value), CliError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(CliError::InvalidField(format!("expected KEY=VALUE, got '{raw}'")));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::InvalidField(format!("missing key in '{raw}'")));
    }
    if RESERVED_KEYS.contains(&key) {
        return Err(CliError::InvalidField(format!("'{key}' cannot be set directly")));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Local record for a pet created on this device
pub fn new_pet_record(id: &PetId, patch: Map<String, Value>) -> PetRecord {
    let mut record = patch;
    record.insert("id".into(), Value::String(id.to_string()));
    record.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
    normalize_record_shape(&Value::Object(record))
}

/// Fold a flat patch into the local record, keeping `patient` in step
pub fn apply_patch(local: &PetRecord, patch: &Map<String, Value>) -> PetRecord {
    let mut incoming = PetRecord::from_map(patch.clone());
    for attribute in PetAttribute::ALL {
        if let Some(value) = patch.get(attribute.flat_key()) {
            incoming.set_patient_field(attribute.nested_key(), value.clone());
        }
    }
    incoming.set("updated_at", Value::String(Utc::now().to_rfc3339()));
    merge(local, &incoming)
}

const fn describe_action(action: &CoalesceAction) -> &'static str {
    match action {
        CoalesceAction::Add(_) => "queued",
        CoalesceAction::Put(_) => "folded into pending change",
        CoalesceAction::Delete => "pending create cancelled",
    }
}
