//! libSQL pet record store

use async_trait::async_trait;
use libsql::Connection;

use super::in_transaction;
use crate::error::{Error, Result};
use crate::models::{PetId, PetRecord};
use crate::records::{rekeyed_record, RecordStore};
use crate::util::unix_millis_now;

/// Pet records stored as JSON documents in the `pets` table
#[derive(Clone)]
pub struct LibSqlRecordStore {
    conn: Connection,
}

impl LibSqlRecordStore {
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn parse_record(raw: &str) -> Result<PetRecord> {
        let value = serde_json::from_str(raw)?;
        PetRecord::from_value(value)
            .ok_or_else(|| Error::Store("stored pet record is not a JSON object".into()))
    }
}

const UPSERT: &str = "INSERT INTO pets (id, record, updated_at) VALUES (?, ?, ?)
     ON CONFLICT(id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at";

#[async_trait]
impl RecordStore for LibSqlRecordStore {
    async fn get(&self, id: &PetId) -> Result<Option<PetRecord>> {
        let mut rows = self
            .conn
            .query("SELECT record FROM pets WHERE id = ?", [id.as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row.get::<String>(0)?)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<PetRecord>> {
        let mut rows = self
            .conn
            .query("SELECT record FROM pets ORDER BY updated_at DESC, id ASC", ())
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row.get::<String>(0)?)?);
        }
        Ok(records)
    }

    async fn put(&self, id: &PetId, record: &PetRecord) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.conn
            .execute(UPSERT, libsql::params![id.as_str(), raw, unix_millis_now()])
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &PetId) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM pets WHERE id = ?", [id.as_str()])
            .await?;
        Ok(removed > 0)
    }

    async fn rekey(&self, from: &PetId, to: &PetId) -> Result<bool> {
        let Some(moved) = self.get(from).await? else {
            return Ok(false);
        };
        let existing = self.get(to).await?;
        let record = rekeyed_record(&moved, existing.as_ref(), to);
        let raw = serde_json::to_string(&record)?;

        in_transaction(
            &self.conn,
            &[
                (
                    "DELETE FROM pets WHERE id = ?",
                    vec![libsql::Value::Text(from.to_string())],
                ),
                (
                    UPSERT,
                    vec![
                        libsql::Value::Text(to.to_string()),
                        libsql::Value::Text(raw),
                        libsql::Value::Integer(unix_millis_now()),
                    ],
                ),
            ],
        )
        .await?;
        Ok(true)
    }
}
