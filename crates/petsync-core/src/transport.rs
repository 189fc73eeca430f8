//! HTTP transport for the sync API.
//!
//! The pipelines talk to the server through [`SyncTransport`] so tests and
//! alternative hosts can substitute their own fetch implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid transport configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

/// Status and raw body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    pub const fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Authenticated fetch used by the push and pull pipelines
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn post_json(
        &self,
        path: &str,
        token: &str,
        body: &Value,
    ) -> Result<TransportResponse, TransportError>;

    async fn get_json(&self, path: &str, token: &str)
        -> Result<TransportResponse, TransportError>;
}

/// [`SyncTransport`] over `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport for an explicit API base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    /// Returns the base URL this transport was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    async fn finish(response: reqwest::Response) -> Result<TransportResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn post_json(
        &self,
        path: &str,
        token: &str,
        body: &Value,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        Self::finish(response).await
    }

    async fn get_json(
        &self,
        path: &str,
        token: &str,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        Self::finish(response).await
    }
}

fn normalize_base_url(raw: String) -> Result<String, TransportError> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        TransportError::InvalidConfiguration("API base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
    }

    #[test]
    fn transport_joins_paths_onto_trimmed_base() {
        let transport =
            HttpTransport::new("https://api.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.base_url(), "https://api.example.com");
        assert_eq!(
            transport.url("/api/sync/pets/push"),
            "https://api.example.com/api/sync/pets/push"
        );
        assert_eq!(
            transport.url("api/sync/pets/pull"),
            "https://api.example.com/api/sync/pets/pull"
        );
    }

    #[test]
    fn response_status_classes() {
        assert!(TransportResponse::new(204, "").is_success());
        assert!(TransportResponse::new(404, "").is_client_error());
        assert!(TransportResponse::new(503, "").is_server_error());
        assert!(!TransportResponse::new(302, "").is_success());
    }
}
