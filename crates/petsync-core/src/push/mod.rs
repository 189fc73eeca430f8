//! Push pipeline.
//!
//! Drains the outbox to the sync API: snapshot the queue, give every entry
//! an idempotency key, send one batch with bounded retry, then acknowledge
//! accepted entries by the storage key captured in the snapshot.

mod projection;
mod retry;

pub use projection::{project_patch, to_op};
pub use retry::{send_with_retry, RetryPolicy};

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::flight::SingleFlight;
use crate::idmap::IdReconciler;
use crate::models::{AcceptedOp, OpType, OutboxEntry, OutboxKey, PushRequest, PushResponse};
use crate::observe;
use crate::outbox::OutboxStore;
use crate::signals::{Connectivity, TokenSource};
use crate::transport::SyncTransport;
use crate::util::unix_millis_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    Offline,
    Unauthenticated,
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Skipped(SkipReason),
    NothingToPush,
    /// The server answered; `accepted` entries were acknowledged locally
    Completed { accepted: usize, rejected: usize },
    /// The batch was refused with a 4xx status
    Rejected { status: u16 },
    /// Every attempt failed; entries stay queued
    Unreachable,
    Failed(String),
}

pub struct PushPipeline {
    outbox: Arc<dyn OutboxStore>,
    transport: Arc<dyn SyncTransport>,
    tokens: Arc<dyn TokenSource>,
    connectivity: Arc<dyn Connectivity>,
    reconciler: Option<Arc<dyn IdReconciler>>,
    device_id: String,
    path: String,
    retry: RetryPolicy,
    flight: SingleFlight,
}

impl PushPipeline {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        transport: Arc<dyn SyncTransport>,
        tokens: Arc<dyn TokenSource>,
        connectivity: Arc<dyn Connectivity>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            outbox,
            transport,
            tokens,
            connectivity,
            reconciler: None,
            device_id: config.device_id().to_string(),
            path: config.push_path.clone(),
            retry: config.retry_policy(),
            flight: SingleFlight::new(),
        }
    }

    #[must_use]
    pub fn with_reconciler(mut self, reconciler: Arc<dyn IdReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Run one push cycle. A call made while another cycle is running
    /// returns immediately.
    pub async fn push(&self) -> PushOutcome {
        let Some(_guard) = self.flight.try_begin() else {
            tracing::debug!("Push already in progress");
            return PushOutcome::Skipped(SkipReason::InFlight);
        };
        if !self.connectivity.is_online() {
            return PushOutcome::Skipped(SkipReason::Offline);
        }
        let Some(token) = self.tokens.token() else {
            return PushOutcome::Skipped(SkipReason::Unauthenticated);
        };
        if !self.outbox.is_available() {
            return PushOutcome::Skipped(SkipReason::StoreUnavailable);
        }

        match self.run(&token).await {
            Ok(outcome) => outcome,
            Err(error) => {
                observe::absorb("push", &error);
                PushOutcome::Failed(error.to_string())
            }
        }
    }

    async fn run(&self, token: &str) -> Result<PushOutcome> {
        let mut snapshot = self.outbox.scan().await?;
        if snapshot.is_empty() {
            return Ok(PushOutcome::NothingToPush);
        }
        self.assign_op_ids(&mut snapshot).await?;

        let client_ts = unix_millis_now();
        let mut ops = Vec::with_capacity(snapshot.len());
        let mut by_op_id = HashMap::with_capacity(snapshot.len());
        for (key, entry) in &snapshot {
            let op_id = entry.op_uuid.clone().unwrap_or_default();
            ops.push(to_op(entry, &op_id, client_ts));
            by_op_id.insert(op_id, (*key, entry));
        }
        let body = serde_json::to_value(PushRequest {
            device_id: self.device_id.clone(),
            ops,
        })?;

        tracing::debug!(ops = snapshot.len(), "Sending push batch");
        let Some(response) = send_with_retry(&self.retry, || {
            self.transport.post_json(&self.path, token, &body)
        })
        .await
        else {
            return Ok(PushOutcome::Unreachable);
        };

        if response.is_client_error() {
            tracing::warn!(status = response.status, body = %response.body, "Push batch rejected");
            return Ok(PushOutcome::Rejected {
                status: response.status,
            });
        }
        if !response.is_success() {
            return Err(Error::Http {
                status: response.status,
                body: response.body,
            });
        }
        let reply: PushResponse = response.json()?;

        let mut accepted = 0;
        for accepted_op in &reply.accepted {
            let Some((key, entry)) = by_op_id.get(accepted_op.op_id()) else {
                tracing::debug!(op_id = accepted_op.op_id(), "Server accepted an unknown op id");
                continue;
            };
            if observe::absorb_result("push.acknowledge", self.acknowledge(*key, entry).await)
                .is_some()
            {
                accepted += 1;
            }
            self.reconcile(entry, accepted_op).await;
        }
        for rejected in &reply.rejected {
            tracing::warn!(%rejected, "Push op rejected; entry stays queued");
        }

        tracing::info!(accepted, rejected = reply.rejected.len(), "Push completed");
        Ok(PushOutcome::Completed {
            accepted,
            rejected: reply.rejected.len(),
        })
    }

    /// Persist an idempotency key for every entry that lacks one. Runs
    /// before any request so a retried batch reuses the same ids.
    async fn assign_op_ids(&self, snapshot: &mut [(OutboxKey, OutboxEntry)]) -> Result<()> {
        for (key, entry) in snapshot.iter_mut() {
            if entry.op_uuid.is_some() {
                continue;
            }
            let op_id = Uuid::now_v7().to_string();
            match self.outbox.get(*key).await? {
                Some(mut current) => {
                    let op_id = current.op_uuid.get_or_insert(op_id).clone();
                    self.outbox.put(*key, &current).await?;
                    entry.op_uuid = Some(op_id);
                }
                None => entry.op_uuid = Some(op_id),
            }
        }
        Ok(())
    }

    /// Drop the acknowledged entry, unless it changed after the snapshot.
    ///
    /// A changed entry keeps its newer content but loses the acknowledged
    /// op id so the next cycle sends it fresh; an accepted create is now an
    /// update.
    async fn acknowledge(&self, key: OutboxKey, sent: &OutboxEntry) -> Result<()> {
        match self.outbox.get(key).await? {
            None => Ok(()),
            Some(current) if &current == sent => self.outbox.delete(key).await,
            Some(mut current) => {
                tracing::debug!(%key, pet_id = %current.pet_local_id, "Entry changed while in flight");
                current.op_uuid = None;
                if current.op_type == OpType::Create {
                    current.op_type = OpType::Update;
                }
                self.outbox.put(key, &current).await
            }
        }
    }

    async fn reconcile(&self, sent: &OutboxEntry, accepted: &AcceptedOp) {
        let local = &sent.pet_local_id;
        if !local.is_temporary() || sent.op_type == OpType::Delete {
            return;
        }
        let Some(reconciler) = &self.reconciler else {
            return;
        };
        let Some(server) = accepted.server_id() else {
            tracing::warn!(local = %local, "Accepted create carried no server id");
            return;
        };

        observe::absorb_result(
            "push.persist_mapping",
            reconciler.persist_mapping(local, &server).await,
        );
        observe::absorb_result(
            "push.migrate_local_id",
            reconciler.migrate_local_id(local, &server).await,
        );
    }
}
