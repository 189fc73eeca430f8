//! Sync engine: one push pipeline and one pull pipeline over shared stores.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::idmap::{IdMap, IdMappingStore, LocalReconciler};
use crate::outbox::OutboxStore;
use crate::pull::{PullOutcome, PullPipeline};
use crate::push::{PushOutcome, PushPipeline};
use crate::records::{CursorStore, RecordStore};
use crate::scheduler::SyncRunner;
use crate::signals::{Connectivity, TokenSource};
use crate::transport::SyncTransport;

/// Local storage the engine syncs
#[derive(Clone)]
pub struct SyncStores {
    pub outbox: Arc<dyn OutboxStore>,
    pub records: Arc<dyn RecordStore>,
    pub cursors: Arc<dyn CursorStore>,
    pub mappings: Option<Arc<dyn IdMappingStore>>,
}

pub struct SyncEngine {
    push: PushPipeline,
    pull: PullPipeline,
    ids: Arc<IdMap>,
    mappings: Option<Arc<dyn IdMappingStore>>,
}

impl SyncEngine {
    pub fn new(
        config: &SyncConfig,
        stores: SyncStores,
        transport: Arc<dyn SyncTransport>,
        tokens: Arc<dyn TokenSource>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let ids = Arc::new(IdMap::new());

        let mut reconciler =
            LocalReconciler::new(ids.clone(), stores.records.clone(), stores.outbox.clone());
        if let Some(mappings) = &stores.mappings {
            reconciler = reconciler.with_mapping_store(mappings.clone());
        }

        let push = PushPipeline::new(
            stores.outbox,
            transport.clone(),
            tokens.clone(),
            connectivity.clone(),
            config,
        )
        .with_reconciler(Arc::new(reconciler));
        let pull = PullPipeline::new(
            transport,
            tokens,
            connectivity,
            stores.records,
            stores.cursors,
            ids.clone(),
            config.pull_settings(),
        );

        Self {
            push,
            pull,
            ids,
            mappings: stores.mappings,
        }
    }

    /// Load persisted id mappings into the in-memory table.
    ///
    /// Returns how many mappings were loaded.
    pub async fn restore_id_map(&self) -> Result<usize> {
        let Some(mappings) = &self.mappings else {
            return Ok(0);
        };
        let mut loaded = 0;
        for (local, server) in mappings.load_mappings().await? {
            if self.ids.record(&local, &server) {
                loaded += 1;
            }
        }
        tracing::debug!(loaded, "Restored id mappings");
        Ok(loaded)
    }

    pub fn ids(&self) -> &Arc<IdMap> {
        &self.ids
    }

    pub async fn push_now(&self) -> PushOutcome {
        self.push.push().await
    }

    pub async fn pull_now(&self, force: bool) -> PullOutcome {
        self.pull.pull(force).await
    }

    /// Push, then pull regardless of how the push went
    pub async fn sync_once(&self, force_pull: bool) -> (PushOutcome, PullOutcome) {
        let pushed = self.push_now().await;
        let pulled = self.pull_now(force_pull).await;
        (pushed, pulled)
    }
}

#[async_trait]
impl SyncRunner for SyncEngine {
    async fn push(&self) -> Result<()> {
        let outcome = self.push_now().await;
        tracing::debug!(?outcome, "Scheduled push finished");
        Ok(())
    }

    async fn pull(&self, force: bool) -> Result<()> {
        let outcome = self.pull_now(force).await;
        tracing::debug!(?outcome, "Scheduled pull finished");
        Ok(())
    }
}
