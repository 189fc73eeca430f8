//! libSQL outbox store

use async_trait::async_trait;
use libsql::{Connection, Row};
use serde_json::{Map, Value};

use super::optional_text;
use crate::error::{Error, Result};
use crate::models::{OutboxEntry, OutboxKey, PetId};
use crate::outbox::OutboxStore;
use crate::util::unix_millis_now;

/// Outbox persisted in the `outbox` table.
///
/// Every call is a single statement, so nothing stays open while the push
/// pipeline waits on the network.
#[derive(Clone)]
pub struct LibSqlOutboxStore {
    conn: Connection,
}

impl LibSqlOutboxStore {
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &Row) -> Result<(OutboxKey, OutboxEntry)> {
        let key = OutboxKey(row.get::<i64>(0)?);
        let op_type = row.get::<String>(1)?.parse()?;
        let payload: Map<String, Value> = serde_json::from_str(&row.get::<String>(2)?)?;
        let op_uuid = match row.get_value(3)? {
            libsql::Value::Text(op_uuid) => Some(op_uuid),
            _ => None,
        };
        let pet_local_id = PetId::from(row.get::<String>(4)?);
        Ok((
            key,
            OutboxEntry::new(op_type, payload, op_uuid, pet_local_id),
        ))
    }
}

const SELECT_COLUMNS: &str = "SELECT key, op_type, payload, op_uuid, pet_local_id FROM outbox";

#[async_trait]
impl OutboxStore for LibSqlOutboxStore {
    async fn scan(&self) -> Result<Vec<(OutboxKey, OutboxEntry)>> {
        let mut rows = self
            .conn
            .query(&format!("{SELECT_COLUMNS} ORDER BY key ASC"), ())
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_row(&row)?);
        }
        Ok(entries)
    }

    async fn get(&self, key: OutboxKey) -> Result<Option<OutboxEntry>> {
        let mut rows = self
            .conn
            .query(&format!("{SELECT_COLUMNS} WHERE key = ?"), [key.0])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_row(&row)?.1)),
            None => Ok(None),
        }
    }

    async fn add(&self, entry: &OutboxEntry) -> Result<OutboxKey> {
        let payload = serde_json::to_string(&entry.payload)?;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO outbox (op_type, payload, op_uuid, pet_local_id, queued_at)
                 VALUES (?, ?, ?, ?, ?)
                 RETURNING key",
                libsql::params![
                    entry.op_type.as_str(),
                    payload,
                    optional_text(entry.op_uuid.as_deref()),
                    entry.pet_local_id.as_str(),
                    unix_millis_now(),
                ],
            )
            .await?;

        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::Store("outbox insert returned no key".into()))?;
        Ok(OutboxKey(row.get::<i64>(0)?))
    }

    async fn put(&self, key: OutboxKey, entry: &OutboxEntry) -> Result<()> {
        let payload = serde_json::to_string(&entry.payload)?;
        let changed = self
            .conn
            .execute(
                "UPDATE outbox SET op_type = ?, payload = ?, op_uuid = ?, pet_local_id = ? WHERE key = ?",
                libsql::params![
                    entry.op_type.as_str(),
                    payload,
                    optional_text(entry.op_uuid.as_deref()),
                    entry.pet_local_id.as_str(),
                    key.0,
                ],
            )
            .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("outbox entry {key}")));
        }
        Ok(())
    }

    async fn delete(&self, key: OutboxKey) -> Result<()> {
        self.conn
            .execute("DELETE FROM outbox WHERE key = ?", [key.0])
            .await?;
        Ok(())
    }
}
