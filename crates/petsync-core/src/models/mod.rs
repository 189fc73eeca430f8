//! Data models for Petsync

mod op;
mod outbox;
mod pet;

pub use op::{AcceptedOp, Op, OpKind, PushRequest, PushResponse};
pub use outbox::{OpType, OutboxEntry, OutboxKey};
pub use pet::{id_from_value, PetAttribute, PetId, PetRecord, ID_KEYS, PATIENT_KEY};
