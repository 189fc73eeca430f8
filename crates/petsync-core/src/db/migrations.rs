//! Database migrations

use crate::error::Result;
use libsql::Connection;

use super::in_transaction;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let mut batch: Vec<(&str, Vec<libsql::Value>)> =
        statements.iter().map(|sql| (*sql, Vec::new())).collect();
    batch.push((
        "INSERT INTO schema_version (version) VALUES (?)",
        vec![libsql::Value::Integer(i64::from(version))],
    ));
    in_transaction(conn, &batch).await?;

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: outbox, pet records, and sync state
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Insertion order is the key order
            "CREATE TABLE IF NOT EXISTS outbox (
                key INTEGER PRIMARY KEY AUTOINCREMENT,
                op_type TEXT NOT NULL CHECK (op_type IN ('create', 'update', 'delete')),
                payload TEXT NOT NULL,
                op_uuid TEXT,
                pet_local_id TEXT NOT NULL,
                queued_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_outbox_pet ON outbox(pet_local_id)",
            "CREATE TABLE IF NOT EXISTS pets (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_pets_updated ON pets(updated_at DESC)",
            "CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ],
    )
    .await
}

/// Migration to version 2: temporary id → server id mappings
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        CURRENT_VERSION,
        &[
            "CREATE TABLE IF NOT EXISTS id_map (
                local_id TEXT PRIMARY KEY,
                server_id TEXT NOT NULL,
                mapped_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_id_map_server ON id_map(server_id)",
        ],
    )
    .await
}
