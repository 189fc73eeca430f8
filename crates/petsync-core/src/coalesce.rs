//! Outbox coalescing.
//!
//! Decides how a new local mutation combines with the entry already queued
//! for the same pet so the outbox never holds more than one network-visible
//! operation per pet.
//!
//! | existing | new    | action | result                                      |
//! |----------|--------|--------|---------------------------------------------|
//! | none     | any    | add    | fresh entry                                 |
//! | create   | update | put    | still `create`, payloads shallow-merged     |
//! | update   | update | put    | still `update`, newest payload              |
//! | create   | delete | delete | entry dropped, the server never saw the pet |
//! | update   | delete | put    | becomes `delete` with the delete's payload  |
//! | other    | other  | add    | fresh entry queued alongside                |

use serde_json::{Map, Value};

use crate::models::{OpType, OutboxEntry, PetId};

/// What the outbox store must do with the result of [`coalesce`]
#[derive(Debug, Clone, PartialEq)]
pub enum CoalesceAction {
    /// Insert a new entry
    Add(OutboxEntry),
    /// Overwrite the existing entry in place (same storage key)
    Put(OutboxEntry),
    /// Remove the existing entry
    Delete,
}

impl CoalesceAction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Put(_) => "put",
            Self::Delete => "delete",
        }
    }

    pub const fn entry(&self) -> Option<&OutboxEntry> {
        match self {
            Self::Add(entry) | Self::Put(entry) => Some(entry),
            Self::Delete => None,
        }
    }
}

/// Combine a new mutation with the entry already queued for `entity_id`.
///
/// Total over every combination of existing/new op types; the original
/// idempotency key survives every in-place merge.
pub fn coalesce(
    existing: Option<&OutboxEntry>,
    new_op_type: OpType,
    new_payload: Map<String, Value>,
    new_op_id: Option<String>,
    entity_id: &PetId,
) -> CoalesceAction {
    let Some(existing) = existing else {
        return CoalesceAction::Add(OutboxEntry::new(
            new_op_type,
            new_payload,
            new_op_id,
            entity_id.clone(),
        ));
    };

    let retained_op_id = existing.op_uuid.clone().or(new_op_id.clone());

    match (existing.op_type, new_op_type) {
        (OpType::Create, OpType::Update) => {
            let mut payload = existing.payload.clone();
            payload.extend(new_payload);
            CoalesceAction::Put(OutboxEntry::new(
                OpType::Create,
                payload,
                retained_op_id,
                existing.pet_local_id.clone(),
            ))
        }
        (OpType::Update, OpType::Update) => CoalesceAction::Put(OutboxEntry::new(
            OpType::Update,
            new_payload,
            retained_op_id,
            existing.pet_local_id.clone(),
        )),
        (OpType::Create, OpType::Delete) => CoalesceAction::Delete,
        (OpType::Update, OpType::Delete) => CoalesceAction::Put(OutboxEntry::new(
            OpType::Delete,
            new_payload,
            retained_op_id,
            existing.pet_local_id.clone(),
        )),
        _ => CoalesceAction::Add(OutboxEntry::new(
            new_op_type,
            new_payload,
            new_op_id,
            entity_id.clone(),
        )),
    }
}
