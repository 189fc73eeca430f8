//! Test doubles shared by the pipeline and scheduler tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::transport::{SyncTransport, TransportError, TransportResponse};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub token: String,
    pub body: Option<Value>,
}

type Scripted = Result<TransportResponse, TransportError>;

/// Transport that replays queued responses and records every request.
///
/// Once the script runs dry, the fallback status (if any) answers every
/// further request; without one the request fails like a dropped connection.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<u16>,
    latency: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `status` and an empty body
    pub fn always(status: u16) -> Self {
        Self {
            fallback: Some(status),
            ..Self::default()
        }
    }

    pub fn respond(self, status: u16, body: &Value) -> Self {
        self.push(Ok(TransportResponse::new(status, body.to_string())))
    }

    pub fn respond_raw(self, status: u16, body: &str) -> Self {
        self.push(Ok(TransportResponse::new(status, body)))
    }

    pub fn fail(self, message: &str) -> Self {
        self.push(Err(TransportError::Other(message.to_string())))
    }

    /// Sleep this long inside every request
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn push(self, response: Scripted) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    async fn answer(&self, request: RecordedRequest) -> Scripted {
        self.requests.lock().unwrap().push(request);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match (next, self.fallback) {
            (Some(response), _) => response,
            (None, Some(status)) => Ok(TransportResponse::new(status, "")),
            (None, None) => Err(TransportError::Other("connection refused".into())),
        }
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    async fn post_json(
        &self,
        path: &str,
        token: &str,
        body: &Value,
    ) -> Result<TransportResponse, TransportError> {
        self.answer(RecordedRequest {
            method: "POST",
            path: path.to_string(),
            token: token.to_string(),
            body: Some(body.clone()),
        })
        .await
    }

    async fn get_json(
        &self,
        path: &str,
        token: &str,
    ) -> Result<TransportResponse, TransportError> {
        self.answer(RecordedRequest {
            method: "GET",
            path: path.to_string(),
            token: token.to_string(),
            body: None,
        })
        .await
    }
}

/// Minimal in-process sync server.
///
/// Accepts every pushed op, assigns `srv-<n>` ids to temporary pets, and
/// answers pulls with every pet it holds.
#[derive(Debug, Default)]
pub struct FakeSyncServer {
    state: Mutex<ServerState>,
}

#[derive(Debug, Default)]
struct ServerState {
    pets: BTreeMap<String, Map<String, Value>>,
    assigned: BTreeMap<String, String>,
    batches: usize,
}

impl FakeSyncServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pet(&self, id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state.pets.get(id).cloned().map(Value::Object)
    }

    pub fn batches(&self) -> usize {
        self.state.lock().unwrap().batches
    }

    fn apply_batch(&self, body: &Value) -> Value {
        let mut state = self.state.lock().unwrap();
        state.batches += 1;
        let mut accepted = Vec::new();
        for op in body["ops"].as_array().into_iter().flatten() {
            let op_id = op["op_id"].as_str().unwrap_or_default().to_string();
            let pet_id = op["pet_id"].as_str().unwrap_or_default().to_string();
            if op["type"] == "delete" {
                state.pets.remove(&pet_id);
                accepted.push(Value::String(op_id));
                continue;
            }
            let server_id = if pet_id.starts_with("tmp_") {
                let next = format!("srv-{}", state.assigned.len() + 1);
                state.assigned.entry(pet_id).or_insert(next).clone()
            } else {
                pet_id
            };
            let pet = state.pets.entry(server_id.clone()).or_default();
            if let Some(patch) = op["patch"].as_object() {
                pet.extend(patch.clone());
            }
            pet.insert("id".into(), Value::String(server_id.clone()));
            accepted.push(json!({"op_id": op_id, "server_id": server_id}));
        }
        json!({"accepted": accepted, "rejected": []})
    }
}

#[async_trait]
impl SyncTransport for FakeSyncServer {
    async fn post_json(
        &self,
        _path: &str,
        _token: &str,
        body: &Value,
    ) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse::new(200, self.apply_batch(body).to_string()))
    }

    async fn get_json(
        &self,
        _path: &str,
        _token: &str,
    ) -> Result<TransportResponse, TransportError> {
        let state = self.state.lock().unwrap();
        let pets: Vec<Value> = state.pets.values().cloned().map(Value::Object).collect();
        let body = json!({"pets": pets, "next_cursor": format!("v{}", state.batches)});
        Ok(TransportResponse::new(200, body.to_string()))
    }
}
