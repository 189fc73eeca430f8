//! Temporary-id to server-id reconciliation.
//!
//! Each pet created offline gets exactly one mapping, recorded when its
//! create is accepted. Other components resolve ids through [`IdMap`]
//! instead of re-deriving the relationship themselves.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::PetId;
use crate::outbox::{rewrite_entity_id, OutboxStore};
use crate::records::RecordStore;

/// In-memory local-id → server-id table; the first mapping for an id wins.
#[derive(Debug, Default)]
pub struct IdMap {
    entries: RwLock<HashMap<PetId, PetId>>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from persisted mappings
    pub fn from_pairs(pairs: impl IntoIterator<Item = (PetId, PetId)>) -> Self {
        let map = Self::new();
        for (local, server) in pairs {
            map.record(&local, &server);
        }
        map
    }

    /// Record a mapping; returns `false` when `local` was already mapped
    pub fn record(&self, local: &PetId, server: &PetId) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if entries.contains_key(local) {
            return false;
        }
        entries.insert(local.clone(), server.clone());
        true
    }

    pub fn server_id_for(&self, local: &PetId) -> Option<PetId> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(local).cloned())
    }

    /// Server id for a retired temporary id, otherwise the id itself
    pub fn resolve(&self, id: &PetId) -> PetId {
        self.server_id_for(id).unwrap_or_else(|| id.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Durable home for id mappings
#[async_trait]
pub trait IdMappingStore: Send + Sync {
    async fn save_mapping(&self, local: &PetId, server: &PetId) -> Result<()>;

    async fn load_mappings(&self) -> Result<Vec<(PetId, PetId)>>;
}

/// Best-effort hooks run after a create is accepted
#[async_trait]
pub trait IdReconciler: Send + Sync {
    async fn persist_mapping(&self, local: &PetId, server: &PetId) -> Result<()>;

    async fn migrate_local_id(&self, local: &PetId, server: &PetId) -> Result<()>;
}

/// Reconciler over the local record store and outbox
pub struct LocalReconciler {
    ids: Arc<IdMap>,
    mappings: Option<Arc<dyn IdMappingStore>>,
    records: Arc<dyn RecordStore>,
    outbox: Arc<dyn OutboxStore>,
}

impl LocalReconciler {
    pub fn new(
        ids: Arc<IdMap>,
        records: Arc<dyn RecordStore>,
        outbox: Arc<dyn OutboxStore>,
    ) -> Self {
        Self {
            ids,
            mappings: None,
            records,
            outbox,
        }
    }

    #[must_use]
    pub fn with_mapping_store(mut self, mappings: Arc<dyn IdMappingStore>) -> Self {
        self.mappings = Some(mappings);
        self
    }
}

#[async_trait]
impl IdReconciler for LocalReconciler {
    async fn persist_mapping(&self, local: &PetId, server: &PetId) -> Result<()> {
        if !self.ids.record(local, server) {
            tracing::debug!(local = %local, server = %server, "Id mapping already recorded");
            return Ok(());
        }
        if let Some(mappings) = &self.mappings {
            mappings.save_mapping(local, server).await?;
        }
        Ok(())
    }

    async fn migrate_local_id(&self, local: &PetId, server: &PetId) -> Result<()> {
        let moved = self.records.rekey(local, server).await?;
        let rewritten = rewrite_entity_id(self.outbox.as_ref(), local, server).await?;
        tracing::info!(
            local = %local,
            server = %server,
            record_moved = moved,
            outbox_rewritten = rewritten,
            "Migrated temporary pet id"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpType, PetRecord};
    use crate::outbox::{enqueue, MemoryOutboxStore};
    use crate::records::MemoryRecordStore;
    use serde_json::{json, Map};

    #[test]
    fn first_mapping_wins() {
        let ids = IdMap::new();
        assert!(ids.record(&PetId::from("tmp_1"), &PetId::from("srv-1")));
        assert!(!ids.record(&PetId::from("tmp_1"), &PetId::from("srv-2")));
        assert_eq!(ids.resolve(&PetId::from("tmp_1")), PetId::from("srv-1"));
        assert_eq!(ids.resolve(&PetId::from("p9")), PetId::from("p9"));
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn local_reconciler_moves_record_and_outbox() {
        let ids = Arc::new(IdMap::new());
        let records = Arc::new(MemoryRecordStore::new());
        let outbox = Arc::new(MemoryOutboxStore::new());
        let temporary = PetId::from("tmp_1");
        let server = PetId::from("srv-1");

        records
            .put(
                &temporary,
                &PetRecord::from_value(json!({"id": "tmp_1", "name": "Rex"})).unwrap(),
            )
            .await
            .unwrap();
        enqueue(outbox.as_ref(), OpType::Update, Map::new(), &temporary)
            .await
            .unwrap();

        let reconciler = LocalReconciler::new(ids.clone(), records.clone(), outbox.clone());
        reconciler.persist_mapping(&temporary, &server).await.unwrap();
        reconciler.migrate_local_id(&temporary, &server).await.unwrap();

        assert_eq!(ids.resolve(&temporary), server);
        assert!(records.get(&server).await.unwrap().is_some());
        let entries = outbox.scan().await.unwrap();
        assert_eq!(entries[0].1.pet_local_id, server);
    }
}
