//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;
use super::{LibSqlIdMappingStore, LibSqlOutboxStore, LibSqlRecordStore, LibSqlSyncState};

/// Local libSQL database holding everything the sync core persists
pub struct Database {
    // Owns the handle `conn` was opened from
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::init(db).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::init(db).await
    }

    async fn init(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self { _db: db, conn };
        database.configure().await?;
        migrations::run(&database.conn).await?;
        Ok(database)
    }

    /// Configure `SQLite` for a single-writer local store
    async fn configure(&self) -> Result<()> {
        // Not every build honours these; a failure here is not fatal
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn outbox(&self) -> LibSqlOutboxStore {
        LibSqlOutboxStore::new(self.conn.clone())
    }

    pub fn records(&self) -> LibSqlRecordStore {
        LibSqlRecordStore::new(self.conn.clone())
    }

    pub fn sync_state(&self) -> LibSqlSyncState {
        LibSqlSyncState::new(self.conn.clone())
    }

    pub fn id_mappings(&self) -> LibSqlIdMappingStore {
        LibSqlIdMappingStore::new(self.conn.clone())
    }
}
