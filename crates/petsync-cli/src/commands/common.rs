use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use petsync_core::db::Database;
use petsync_core::records::RecordStore;
use petsync_core::util::compact_text;
use petsync_core::{PetId, PetRecord};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

pub const ENV_DB_PATH: &str = "PETSYNC_DB_PATH";

#[derive(Debug, Serialize)]
pub struct PetListItem {
    pub id: String,
    pub name: String,
    pub species: Option<String>,
    pub pending_server_id: bool,
    pub relative_time: Option<String>,
    pub record: Value,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("petsync").join("petsync.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".into()))
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path).await?)
}

pub fn normalize_pet_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyPetId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a pet by exact id or a unique id prefix
pub async fn resolve_pet(
    query: &str,
    records: &dyn RecordStore,
) -> Result<(PetId, PetRecord), CliError> {
    let query = normalize_pet_identifier(query)?;
    let exact = PetId::from(query.as_str());
    if let Some(record) = records.get(&exact).await? {
        return Ok((exact, record));
    }

    let mut matches = records
        .list()
        .await?
        .into_iter()
        .filter_map(|record| record.id().map(|id| (id, record)))
        .filter(|(id, _)| id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::PetNotFound(query)),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|(id, _)| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousPetId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &PetId) -> String {
    id.as_str().chars().take(13).collect()
}

/// Display name from the flat field, then the nested patient
pub fn pet_name(record: &PetRecord) -> String {
    let name = record.text("name").or_else(|| {
        record
            .patient()
            .and_then(|patient| patient.get("petName"))
            .and_then(Value::as_str)
    });
    name.map(compact_text)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "(unnamed)".to_string())
}

pub fn record_updated_at_ms(record: &PetRecord) -> Option<i64> {
    match record.get("updated_at").or_else(|| record.get("updatedAt"))? {
        Value::Number(number) => number.as_i64(),
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|date_time| date_time.timestamp_millis()),
        _ => None,
    }
}

pub fn pet_to_list_item(record: &PetRecord) -> PetListItem {
    let now_ms = Utc::now().timestamp_millis();
    let id = record.id();
    PetListItem {
        id: id.as_ref().map(ToString::to_string).unwrap_or_default(),
        name: pet_name(record),
        species: record.text("species").map(ToString::to_string),
        pending_server_id: id.as_ref().is_some_and(PetId::is_temporary),
        relative_time: record_updated_at_ms(record)
            .map(|updated_at| format_relative_time(updated_at, now_ms)),
        record: record.clone().into_value(),
    }
}

pub fn format_pet_lines(records: &[PetRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let id = record.id().map(|id| short_id(&id)).unwrap_or_default();
            let name = pet_name(record);
            let species = record.text("species").unwrap_or("-");
            let relative_time = record_updated_at_ms(record)
                .map(|updated_at| format_relative_time(updated_at, now_ms))
                .unwrap_or_default();
            format!("{id:<13}  {name:<24}  {species:<10}  {relative_time}")
        })
        .collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}
