//! petsync-core - offline pet record sync
//!
//! Local mutations are queued in an outbox and coalesced per pet, pushed to
//! the server in idempotent batches, and remote changes are pulled back and
//! folded into local records without losing locally-known fields.

pub mod coalesce;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod flight;
pub mod idmap;
pub mod merge;
pub mod models;
pub mod observe;
pub mod outbox;
pub mod pull;
pub mod push;
pub mod records;
pub mod scheduler;
pub mod signals;
pub mod transport;
pub mod util;

#[cfg(test)]
mod testing;

pub use coalesce::{coalesce, CoalesceAction};
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncStores};
pub use error::{Error, Result};
pub use merge::merge;
pub use models::{OpType, OutboxEntry, OutboxKey, PetId, PetRecord};
pub use pull::{normalize_pull, normalize_record_shape, NormalizedPull, PullOutcome};
pub use push::{PushOutcome, SkipReason};
pub use scheduler::{SyncRunner, SyncScheduler, SyncTrigger};
