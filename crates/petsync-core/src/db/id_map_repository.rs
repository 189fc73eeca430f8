//! libSQL id mapping store

use async_trait::async_trait;
use libsql::Connection;

use crate::error::Result;
use crate::idmap::IdMappingStore;
use crate::models::PetId;
use crate::util::unix_millis_now;

/// Temporary → server id pairs in the `id_map` table
#[derive(Clone)]
pub struct LibSqlIdMappingStore {
    conn: Connection,
}

impl LibSqlIdMappingStore {
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl IdMappingStore for LibSqlIdMappingStore {
    async fn save_mapping(&self, local: &PetId, server: &PetId) -> Result<()> {
        // First mapping wins; a replayed accept must not remap the id
        self.conn
            .execute(
                "INSERT OR IGNORE INTO id_map (local_id, server_id, mapped_at) VALUES (?, ?, ?)",
                libsql::params![local.as_str(), server.as_str(), unix_millis_now()],
            )
            .await?;
        Ok(())
    }

    async fn load_mappings(&self) -> Result<Vec<(PetId, PetId)>> {
        let mut rows = self
            .conn
            .query("SELECT local_id, server_id FROM id_map ORDER BY mapped_at ASC", ())
            .await?;

        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push((
                PetId::from(row.get::<String>(0)?),
                PetId::from(row.get::<String>(1)?),
            ));
        }
        Ok(mappings)
    }
}
