//! Local record store contract.
//!
//! The host owns the real record store; the sync core only needs keyed
//! get/put/delete, a re-key for id reconciliation, and a place to keep the
//! pull cursor.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::merge::merge;
use crate::models::{PetId, PetRecord};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &PetId) -> Result<Option<PetRecord>>;

    async fn list(&self) -> Result<Vec<PetRecord>>;

    async fn put(&self, id: &PetId, record: &PetRecord) -> Result<()>;

    /// Remove a record; returns whether one existed
    async fn delete(&self, id: &PetId) -> Result<bool>;

    /// Move the record stored under a temporary id to its server id.
    ///
    /// Returns whether a record was moved.
    async fn rekey(&self, from: &PetId, to: &PetId) -> Result<bool>;
}

/// Persisted position in the server's change feed
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self) -> Result<Option<String>>;

    async fn save_cursor(&self, cursor: &str) -> Result<()>;
}

/// Re-identify `moved` under `to`, folding in any record already stored
/// there (a pull may have landed the server copy first).
pub fn rekeyed_record(moved: &PetRecord, existing: Option<&PetRecord>, to: &PetId) -> PetRecord {
    let mut record = match existing {
        Some(existing) => merge(moved, existing),
        None => moved.clone(),
    };
    record.set("id", Value::String(to.to_string()));
    record.set("server_id", Value::String(to.to_string()));
    record
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<PetId, PetRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: &PetId) -> Result<Option<PetRecord>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<PetRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn put(&self, id: &PetId, record: &PetRecord) -> Result<()> {
        self.records.lock().await.insert(id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &PetId) -> Result<bool> {
        Ok(self.records.lock().await.remove(id).is_some())
    }

    async fn rekey(&self, from: &PetId, to: &PetId) -> Result<bool> {
        let mut records = self.records.lock().await;
        let Some(moved) = records.remove(from) else {
            return Ok(false);
        };
        let record = rekeyed_record(&moved, records.get(to), to);
        records.insert(to.clone(), record);
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursor: Mutex<Option<String>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load_cursor(&self) -> Result<Option<String>> {
        Ok(self.cursor.lock().await.clone())
    }

    async fn save_cursor(&self, cursor: &str) -> Result<()> {
        *self.cursor.lock().await = Some(cursor.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> PetRecord {
        PetRecord::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn rekey_moves_record_and_stamps_server_id() {
        let store = MemoryRecordStore::new();
        let temporary = PetId::from("tmp_1");
        store
            .put(&temporary, &record(json!({"id": "tmp_1", "name": "Rex"})))
            .await
            .unwrap();

        assert!(store.rekey(&temporary, &PetId::from("srv-1")).await.unwrap());

        assert!(store.get(&temporary).await.unwrap().is_none());
        assert_eq!(
            store.get(&PetId::from("srv-1")).await.unwrap().unwrap().into_value(),
            json!({"id": "srv-1", "server_id": "srv-1", "name": "Rex"})
        );
    }

    #[tokio::test]
    async fn rekey_folds_into_record_already_pulled() {
        let store = MemoryRecordStore::new();
        store
            .put(
                &PetId::from("tmp_1"),
                &record(json!({"id": "tmp_1", "name": "Rex", "breed": "Lab"})),
            )
            .await
            .unwrap();
        store
            .put(
                &PetId::from("srv-1"),
                &record(json!({"id": "srv-1", "version": 2})),
            )
            .await
            .unwrap();

        store
            .rekey(&PetId::from("tmp_1"), &PetId::from("srv-1"))
            .await
            .unwrap();

        let merged = store.get(&PetId::from("srv-1")).await.unwrap().unwrap();
        assert_eq!(merged.text("breed"), Some("Lab"));
        assert_eq!(merged.get("version"), Some(&json!(2)));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rekey_without_source_is_noop() {
        let store = MemoryRecordStore::new();
        assert!(!store
            .rekey(&PetId::from("tmp_x"), &PetId::from("srv"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn cursor_round_trips() {
        let cursors = MemoryCursorStore::new();
        assert_eq!(cursors.load_cursor().await.unwrap(), None);
        cursors.save_cursor("c1").await.unwrap();
        assert_eq!(cursors.load_cursor().await.unwrap().as_deref(), Some("c1"));
    }
}
