//! Outbox entry model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::PetId;
use crate::error::Error;

/// Kind of local mutation waiting in the outbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown op type: {other}"))),
        }
    }
}

/// Storage key of an outbox entry; keys grow with insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxKey(pub i64);

impl fmt::Display for OutboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pending local mutation.
///
/// At most one entry exists per pet at any time; the coalescer folds later
/// mutations into it until a push is acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub op_type: OpType,
    pub payload: Map<String, Value>,
    /// Idempotency key; assigned lazily before the first transmission
    pub op_uuid: Option<String>,
    pub pet_local_id: PetId,
}

impl OutboxEntry {
    pub fn new(
        op_type: OpType,
        payload: Map<String, Value>,
        op_uuid: Option<String>,
        pet_local_id: PetId,
    ) -> Self {
        Self {
            op_type,
            payload,
            op_uuid,
            pet_local_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_type_parses_case_insensitively() {
        assert_eq!("CREATE".parse::<OpType>().unwrap(), OpType::Create);
        assert_eq!(" delete ".parse::<OpType>().unwrap(), OpType::Delete);
        assert!("upsert".parse::<OpType>().is_err());
    }

    #[test]
    fn op_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&OpType::Update).unwrap(),
            "\"update\""
        );
    }
}
