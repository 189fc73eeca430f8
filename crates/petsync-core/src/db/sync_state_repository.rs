//! Sync state repository: pull cursor and device identity

use async_trait::async_trait;
use libsql::Connection;

use crate::error::Result;
use crate::records::CursorStore;

const CURSOR_KEY: &str = "pull_cursor";
const DEVICE_ID_KEY: &str = "device_id";

/// Key/value sync bookkeeping in the `sync_state` table
#[derive(Clone)]
pub struct LibSqlSyncState {
    conn: Connection,
}

impl LibSqlSyncState {
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Device id for push batches, generated and saved on first use
    pub async fn device_id(&self) -> Result<String> {
        if let Some(device_id) = self.get_value(DEVICE_ID_KEY).await? {
            return Ok(device_id);
        }
        let device_id = uuid::Uuid::now_v7().to_string();
        self.set_value(DEVICE_ID_KEY, &device_id).await?;
        tracing::debug!(%device_id, "Generated device id");
        Ok(device_id)
    }

    /// Forget the pull cursor so the next pull starts from scratch
    pub async fn reset_cursor(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_state WHERE key = ?", [CURSOR_KEY])
            .await?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for LibSqlSyncState {
    async fn load_cursor(&self) -> Result<Option<String>> {
        self.get_value(CURSOR_KEY).await
    }

    async fn save_cursor(&self, cursor: &str) -> Result<()> {
        self.set_value(CURSOR_KEY, cursor).await
    }
}
