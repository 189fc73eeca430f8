use std::path::Path;

use petsync_core::outbox::OutboxStore;
use petsync_core::{OutboxEntry, OutboxKey};
use serde::Serialize;
use serde_json::Value;

use crate::commands::common::open_database;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct OutboxItem {
    pub key: i64,
    pub op_type: String,
    pub pet_id: String,
    pub op_id: Option<String>,
    pub payload: Value,
}

pub async fn run_outbox(json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let entries = db.outbox().scan().await?;

    if json {
        let items = entries
            .iter()
            .map(|(key, entry)| outbox_to_item(*key, entry))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }
    for line in format_outbox_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub fn outbox_to_item(key: OutboxKey, entry: &OutboxEntry) -> OutboxItem {
    OutboxItem {
        key: key.0,
        op_type: entry.op_type.to_string(),
        pet_id: entry.pet_local_id.to_string(),
        op_id: entry.op_uuid.clone(),
        payload: Value::Object(entry.payload.clone()),
    }
}

pub fn format_outbox_lines(entries: &[(OutboxKey, OutboxEntry)]) -> Vec<String> {
    entries
        .iter()
        .map(|(key, entry)| {
            let op_id = entry.op_uuid.as_deref().unwrap_or("(not sent)");
            format!(
                "{:>5}  {:<6}  {:<40}  {op_id}",
                key.0,
                entry.op_type.as_str(),
                entry.pet_local_id.as_str(),
            )
        })
        .collect()
}
