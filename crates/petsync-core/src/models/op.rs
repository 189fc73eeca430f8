//! Wire-level push operations

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Upsert,
    Delete,
}

/// One operation as sent to `POST /api/sync/pets/push`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub op_id: String,
    #[serde(rename = "type")]
    pub kind: OpKind,
    pub pet_id: PetId,
    pub base_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Map<String, Value>>,
    pub client_ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub device_id: String,
    pub ops: Vec<Op>,
}

/// Accepted entries arrive either as bare op ids or as objects that may also
/// carry the server id assigned to a created pet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AcceptedOp {
    Id(String),
    Detailed {
        op_id: String,
        #[serde(default)]
        server_id: Option<String>,
        #[serde(default)]
        pet_id: Option<String>,
    },
}

impl AcceptedOp {
    pub fn op_id(&self) -> &str {
        match self {
            Self::Id(op_id) | Self::Detailed { op_id, .. } => op_id,
        }
    }

    pub fn server_id(&self) -> Option<PetId> {
        match self {
            Self::Id(_) => None,
            Self::Detailed {
                server_id, pet_id, ..
            } => [server_id, pet_id]
                .into_iter()
                .filter_map(|id| id.as_deref().map(str::trim))
                .find(|id| !id.is_empty())
                .map(PetId::from),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub accepted: Vec<AcceptedOp>,
    #[serde(default)]
    pub rejected: Vec<Value>,
}
