//! Outbox store contract and coalescing enqueue.
//!
//! The store is an ordered key/value queue: a snapshot scan in insertion
//! order plus keyed put/delete. Implementations must not hold a transaction
//! open across calls, since callers await network I/O between them.

mod memory;

pub use memory::MemoryOutboxStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::coalesce::{coalesce, CoalesceAction};
use crate::error::Result;
use crate::models::{OpType, OutboxEntry, OutboxKey, PetId};

/// Durable ordered queue of pending mutations
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Whether the backing store can be reached right now
    fn is_available(&self) -> bool {
        true
    }

    /// Snapshot of every entry in insertion order
    async fn scan(&self) -> Result<Vec<(OutboxKey, OutboxEntry)>>;

    async fn get(&self, key: OutboxKey) -> Result<Option<OutboxEntry>>;

    /// Append an entry and return its new key
    async fn add(&self, entry: &OutboxEntry) -> Result<OutboxKey>;

    /// Overwrite the entry stored under `key`
    async fn put(&self, key: OutboxKey, entry: &OutboxEntry) -> Result<()>;

    async fn delete(&self, key: OutboxKey) -> Result<()>;
}

/// Most recently queued entry for `entity_id`
pub async fn latest_for_entity(
    store: &dyn OutboxStore,
    entity_id: &PetId,
) -> Result<Option<(OutboxKey, OutboxEntry)>> {
    Ok(store
        .scan()
        .await?
        .into_iter()
        .rev()
        .find(|(_, entry)| &entry.pet_local_id == entity_id))
}

/// Queue a local mutation, folding it into whatever is already queued for
/// the same pet.
///
/// Deleting a pet whose create has already been given an op id turns the
/// entry into a delete instead of dropping it.
pub async fn enqueue(
    store: &dyn OutboxStore,
    op_type: OpType,
    payload: Map<String, Value>,
    entity_id: &PetId,
) -> Result<CoalesceAction> {
    let existing = latest_for_entity(store, entity_id).await?;
    let action = match existing.as_ref() {
        // A create with an op id may already be on the server; it needs a real delete.
        Some((_, entry))
            if op_type == OpType::Delete
                && entry.op_type == OpType::Create
                && entry.op_uuid.is_some() =>
        {
            CoalesceAction::Put(OutboxEntry::new(
                OpType::Delete,
                payload,
                None,
                entry.pet_local_id.clone(),
            ))
        }
        existing => coalesce(
            existing.map(|(_, entry)| entry),
            op_type,
            payload,
            None,
            entity_id,
        ),
    };

    match (&action, existing) {
        (CoalesceAction::Put(entry), Some((key, _))) => store.put(key, entry).await?,
        (CoalesceAction::Delete, Some((key, _))) => store.delete(key).await?,
        (CoalesceAction::Add(entry), _) => {
            store.add(entry).await?;
        }
        (CoalesceAction::Put(_) | CoalesceAction::Delete, None) => {}
    }

    tracing::debug!(
        pet_id = %entity_id,
        op_type = %op_type,
        action = action.name(),
        "Queued local mutation"
    );
    Ok(action)
}

/// Repoint queued entries from a retired temporary id to its server id.
///
/// Returns how many entries were rewritten.
pub async fn rewrite_entity_id(store: &dyn OutboxStore, from: &PetId, to: &PetId) -> Result<usize> {
    let mut rewritten = 0;
    for (key, mut entry) in store.scan().await? {
        if &entry.pet_local_id != from {
            continue;
        }
        entry.pet_local_id = to.clone();
        if entry
            .payload
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| id == from.as_str())
        {
            entry
                .payload
                .insert("id".into(), Value::String(to.to_string()));
        }
        store.put(key, &entry).await?;
        rewritten += 1;
    }
    Ok(rewritten)
}
