//! libSQL persistence for the outbox, pet records, sync state, and id map

mod connection;
mod id_map_repository;
mod migrations;
mod outbox_repository;
mod pet_repository;
mod sync_state_repository;

pub use connection::Database;
pub use id_map_repository::LibSqlIdMappingStore;
pub use outbox_repository::LibSqlOutboxStore;
pub use pet_repository::LibSqlRecordStore;
pub use sync_state_repository::LibSqlSyncState;

use libsql::Connection;

use crate::error::Result;

/// Run `statements` inside one transaction, rolling back on the first error
pub(crate) async fn in_transaction(conn: &Connection, statements: &[(&str, Vec<libsql::Value>)]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for (sql, params) in statements {
        if let Err(e) = conn.execute(sql, params.clone()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }
    Ok(())
}

/// Nullable text column value
pub(crate) fn optional_text(value: Option<&str>) -> libsql::Value {
    value.map_or(libsql::Value::Null, |text| libsql::Value::Text(text.to_string()))
}
