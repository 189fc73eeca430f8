//! Pull pipeline.
//!
//! Fetches remote changes after the stored cursor, normalizes whatever
//! shape the server answered with, and folds each record into the local
//! store with the non-destructive merge.

mod normalize;
mod shape;

pub use normalize::{normalize_pull, NormalizedPull, PullChange, PullResponse};
pub use shape::normalize_record_shape;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::flight::SingleFlight;
use crate::idmap::IdMap;
use crate::merge::merge;
use crate::models::PetRecord;
use crate::observe;
use crate::records::{CursorStore, RecordStore};
use crate::signals::{Connectivity, TokenSource};
use crate::transport::SyncTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullSettings {
    pub path: String,
    /// Minimum spacing between unforced pulls
    pub min_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullSkip {
    Offline,
    Unauthenticated,
    InFlight,
    Throttled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Skipped(PullSkip),
    Applied {
        upserts: usize,
        deletes: usize,
        cursor: Option<String>,
    },
    Failed(String),
}

pub struct PullPipeline {
    transport: Arc<dyn SyncTransport>,
    tokens: Arc<dyn TokenSource>,
    connectivity: Arc<dyn Connectivity>,
    records: Arc<dyn RecordStore>,
    cursors: Arc<dyn CursorStore>,
    ids: Arc<IdMap>,
    settings: PullSettings,
    flight: SingleFlight,
    last_attempt: Mutex<Option<Instant>>,
}

impl PullPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        tokens: Arc<dyn TokenSource>,
        connectivity: Arc<dyn Connectivity>,
        records: Arc<dyn RecordStore>,
        cursors: Arc<dyn CursorStore>,
        ids: Arc<IdMap>,
        settings: PullSettings,
    ) -> Self {
        Self {
            transport,
            tokens,
            connectivity,
            records,
            cursors,
            ids,
            settings,
            flight: SingleFlight::new(),
            last_attempt: Mutex::new(None),
        }
    }

    /// Pull once. Unless `force` is set, a pull attempted within the
    /// minimum interval of the previous one is skipped.
    pub async fn pull(&self, force: bool) -> PullOutcome {
        if !self.connectivity.is_online() {
            return PullOutcome::Skipped(PullSkip::Offline);
        }
        let Some(token) = self.tokens.token() else {
            return PullOutcome::Skipped(PullSkip::Unauthenticated);
        };
        let Some(_guard) = self.flight.try_begin() else {
            tracing::debug!("Pull already in progress");
            return PullOutcome::Skipped(PullSkip::InFlight);
        };
        if !force && self.throttled() {
            return PullOutcome::Skipped(PullSkip::Throttled);
        }
        self.mark_attempt();

        match self.run(&token).await {
            Ok(outcome) => outcome,
            Err(error) => {
                observe::absorb("pull", &error);
                PullOutcome::Failed(error.to_string())
            }
        }
    }

    fn throttled(&self) -> bool {
        let last = *self
            .last_attempt
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        last.is_some_and(|at| at.elapsed() < self.settings.min_interval)
    }

    fn mark_attempt(&self) {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());
    }

    async fn run(&self, token: &str) -> Result<PullOutcome> {
        let cursor = self.cursors.load_cursor().await?.unwrap_or_default();
        let path = if cursor.is_empty() {
            self.settings.path.clone()
        } else {
            format!(
                "{}?cursor={}",
                self.settings.path,
                urlencoding::encode(&cursor)
            )
        };

        let response = self.transport.get_json(&path, token).await?;
        if !response.is_success() {
            return Err(Error::Http {
                status: response.status,
                body: response.body,
            });
        }
        let body: Value = response.json()?;
        let normalized = normalize_pull(&body);

        let mut complete = true;
        let mut upserts = 0;
        for raw in &normalized.upserts {
            match self.apply_upsert(raw).await {
                Ok(true) => upserts += 1,
                Ok(false) => {}
                Err(error) => {
                    complete = false;
                    observe::absorb("pull.apply_upsert", &error);
                }
            }
        }

        let mut deletes = 0;
        for id in &normalized.deletes {
            let id = self.ids.resolve(id);
            match self.records.delete(&id).await {
                Ok(_) => deletes += 1,
                Err(error) => {
                    complete = false;
                    observe::absorb("pull.apply_delete", &error);
                }
            }
        }

        let cursor = if complete && !normalized.next_cursor.is_empty() {
            self.cursors.save_cursor(&normalized.next_cursor).await?;
            Some(normalized.next_cursor)
        } else {
            None
        };

        tracing::info!(upserts, deletes, cursor = ?cursor, "Pull applied");
        Ok(PullOutcome::Applied {
            upserts,
            deletes,
            cursor,
        })
    }

    /// Merge one remote record into the local store; `false` when the
    /// record carries no usable id.
    async fn apply_upsert(&self, raw: &Value) -> Result<bool> {
        let remote = normalize_record_shape(raw);
        let Some(id) = remote.id() else {
            tracing::debug!("Skipped pulled record without an id");
            return Ok(false);
        };
        let id = self.ids.resolve(&id);
        let local = self.records.get(&id).await?.unwrap_or_else(PetRecord::new);
        let merged = merge(&local, &remote);
        self.records.put(&id, &merged).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PetId;
    use crate::records::{MemoryCursorStore, MemoryRecordStore};
    use crate::signals::{OnlineFlag, SharedToken, StaticToken};
    use crate::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Harness {
        transport: Arc<ScriptedTransport>,
        records: Arc<MemoryRecordStore>,
        cursors: Arc<MemoryCursorStore>,
        online: OnlineFlag,
        pipeline: PullPipeline,
    }

    fn harness(transport: ScriptedTransport) -> Harness {
        harness_with_ids(transport, IdMap::new())
    }

    fn harness_with_ids(transport: ScriptedTransport, ids: IdMap) -> Harness {
        let transport = Arc::new(transport);
        let records = Arc::new(MemoryRecordStore::new());
        let cursors = Arc::new(MemoryCursorStore::new());
        let online = OnlineFlag::new(true);
        let pipeline = PullPipeline::new(
            transport.clone(),
            Arc::new(StaticToken::new(Some("token-1".into()))),
            Arc::new(online.clone()),
            records.clone(),
            cursors.clone(),
            Arc::new(ids),
            PullSettings {
                path: "/api/sync/pets/pull".into(),
                min_interval: Duration::from_secs(15),
            },
        );
        Harness {
            transport,
            records,
            cursors,
            online,
            pipeline,
        }
    }

    #[tokio::test]
    async fn pull_merges_records_and_saves_cursor() {
        let h = harness(ScriptedTransport::new().respond(
            200,
            &json!({"pets": [{"id": "p1", "name": "Alfa", "species": "cat"}], "next_cursor": "c 1"}),
        ));
        h.records
            .put(
                &PetId::from("p1"),
                &PetRecord::from_value(json!({"id": "p1", "name": "Old", "microchip": "123"})).unwrap(),
            )
            .await
            .unwrap();

        let outcome = h.pipeline.pull(false).await;

        assert_eq!(
            outcome,
            PullOutcome::Applied {
                upserts: 1,
                deletes: 0,
                cursor: Some("c 1".into())
            }
        );
        let stored = h.records.get(&PetId::from("p1")).await.unwrap().unwrap();
        assert_eq!(stored.text("name"), Some("Alfa"));
        assert_eq!(stored.text("microchip"), Some("123"));
        assert_eq!(
            stored.patient().and_then(|patient| patient.get("petName")),
            Some(&json!("Alfa"))
        );
        assert_eq!(h.cursors.load_cursor().await.unwrap(), Some("c 1".into()));

        h.transport_requests_path_eq("/api/sync/pets/pull");
    }

    impl Harness {
        fn transport_requests_path_eq(&self, path: &str) {
            let requests = self.transport.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].method, "GET");
            assert_eq!(requests[0].path, path);
            assert_eq!(requests[0].token, "token-1");
        }
    }

    #[tokio::test]
    async fn stored_cursor_is_sent_url_encoded() {
        let h = harness(ScriptedTransport::new().respond(200, &json!([])));
        h.cursors.save_cursor("a&b c").await.unwrap();

        h.pipeline.pull(true).await;

        h.transport_requests_path_eq("/api/sync/pets/pull?cursor=a%26b%20c");
    }

    #[tokio::test]
    async fn deletes_resolve_through_id_map() {
        let ids = IdMap::new();
        ids.record(&PetId::from("tmp_1"), &PetId::from("srv-1"));
        let h = harness_with_ids(
            ScriptedTransport::new().respond(
                200,
                &json!({"changes": [{"type": "pet.delete", "pet_id": "tmp_1"}]}),
            ),
            ids,
        );
        h.records
            .put(&PetId::from("srv-1"), &PetRecord::with_id(&PetId::from("srv-1")))
            .await
            .unwrap();

        let outcome = h.pipeline.pull(true).await;

        assert_eq!(
            outcome,
            PullOutcome::Applied {
                upserts: 0,
                deletes: 1,
                cursor: None
            }
        );
        assert!(h.records.get(&PetId::from("srv-1")).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unforced_pulls_are_throttled() {
        let h = harness(
            ScriptedTransport::new()
                .respond(200, &json!([]))
                .respond(200, &json!([]))
                .respond(200, &json!([])),
        );

        assert!(matches!(h.pipeline.pull(false).await, PullOutcome::Applied { .. }));
        assert_eq!(
            h.pipeline.pull(false).await,
            PullOutcome::Skipped(PullSkip::Throttled)
        );
        assert!(matches!(h.pipeline.pull(true).await, PullOutcome::Applied { .. }));

        tokio::time::advance(Duration::from_secs(16)).await;
        assert!(matches!(h.pipeline.pull(false).await, PullOutcome::Applied { .. }));
        assert_eq!(h.transport.request_count(), 3);
    }

    #[tokio::test]
    async fn offline_and_unauthenticated_pulls_skip() {
        let h = harness(ScriptedTransport::new());
        h.online.set(false);
        assert_eq!(h.pipeline.pull(true).await, PullOutcome::Skipped(PullSkip::Offline));

        let pipeline = PullPipeline::new(
            Arc::new(ScriptedTransport::new()),
            Arc::new(SharedToken::new()),
            Arc::new(OnlineFlag::new(true)),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryCursorStore::new()),
            Arc::new(IdMap::new()),
            PullSettings {
                path: "/pull".into(),
                min_interval: Duration::ZERO,
            },
        );
        assert_eq!(
            pipeline.pull(true).await,
            PullOutcome::Skipped(PullSkip::Unauthenticated)
        );
        assert_eq!(h.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn server_errors_and_bad_bodies_are_absorbed() {
        let h = harness(
            ScriptedTransport::new()
                .respond_raw(503, "down")
                .respond_raw(200, "not json")
                .fail("reset"),
        );

        for _ in 0..3 {
            assert!(matches!(h.pipeline.pull(true).await, PullOutcome::Failed(_)));
        }
        assert_eq!(h.cursors.load_cursor().await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_without_ids_are_skipped() {
        let h = harness(ScriptedTransport::new().respond(
            200,
            &json!({"items": [{"name": "Nobody"}, {"server_id": 7, "name": "Seven"}], "cursor": "c9"}),
        ));

        let outcome = h.pipeline.pull(false).await;

        assert_eq!(
            outcome,
            PullOutcome::Applied {
                upserts: 1,
                deletes: 0,
                cursor: Some("c9".into())
            }
        );
        let stored = h.records.get(&PetId::from("7")).await.unwrap().unwrap();
        assert_eq!(stored.text("name"), Some("Seven"));
    }
}
