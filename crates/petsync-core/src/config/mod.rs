//! Sync configuration.
//!
//! One serde-friendly `SyncConfig` carries every endpoint, interval, and
//! retry budget the pipelines and scheduler need. Durations are stored as
//! plain integers so the struct round-trips through JSON profiles.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pull::PullSettings;
use crate::push::RetryPolicy;
use crate::scheduler::SchedulerConfig;
use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_PUSH_PATH: &str = "/api/sync/pets/push";
pub const DEFAULT_PULL_PATH: &str = "/api/sync/pets/pull";

pub const ENV_API_BASE_URL: &str = "PETSYNC_API_BASE_URL";
pub const ENV_DEVICE_ID: &str = "PETSYNC_DEVICE_ID";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct SyncConfig {
    pub api_base_url: Option<String>,
    pub device_id: Option<String>,
    pub push_path: String,
    pub pull_path: String,
    pub push_interval_secs: u64,
    pub push_debounce_ms: u64,
    pub pull_min_interval_ms: u64,
    pub token_poll_interval_ms: u64,
    pub token_poll_timeout_ms: u64,
    pub retry_delays_ms: Vec<u64>,
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            device_id: None,
            push_path: DEFAULT_PUSH_PATH.to_string(),
            pull_path: DEFAULT_PULL_PATH.to_string(),
            push_interval_secs: 30,
            push_debounce_ms: 5_000,
            pull_min_interval_ms: 15_000,
            token_poll_interval_ms: 500,
            token_poll_timeout_ms: 15_000,
            retry_delays_ms: vec![1_000, 2_000, 4_000],
            request_timeout_secs: 20,
        }
    }
}

impl SyncConfig {
    /// Create a configuration for the given API and device
    pub fn new(api_base_url: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            api_base_url: Some(api_base_url.into()),
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    /// Parse a JSON document, rejecting unknown fields
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.normalize();
        Ok(config)
    }

    /// Override endpoint and device id from environment-style lookups.
    ///
    /// Takes the lookup as a closure so callers decide where values come from.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup(ENV_API_BASE_URL)) {
            self.api_base_url = Some(url);
        }
        if let Some(device_id) = normalize_text_option(lookup(ENV_DEVICE_ID)) {
            self.device_id = Some(device_id);
        }
        self
    }

    #[must_use]
    pub const fn with_push_interval(mut self, interval: Duration) -> Self {
        self.push_interval_secs = interval.as_secs();
        self
    }

    #[must_use]
    pub fn with_retry_delays(mut self, delays: &[Duration]) -> Self {
        self.retry_delays_ms = delays.iter().map(duration_millis).collect();
        self
    }

    #[must_use]
    pub fn with_pull_min_interval(mut self, interval: Duration) -> Self {
        self.pull_min_interval_ms = duration_millis(&interval);
        self
    }

    /// Trim optional text fields and drop empties
    pub fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.device_id = normalize_text_option(self.device_id.take());
    }

    /// Check that the config can drive a sync session
    pub fn validate(&self) -> Result<()> {
        let url = self
            .api_base_url
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("api_base_url is required".into()))?;
        if !is_http_url(url) {
            return Err(Error::InvalidInput(
                "api_base_url must include http:// or https://".into(),
            ));
        }
        if self.device_id.is_none() {
            return Err(Error::InvalidInput("device_id is required".into()));
        }
        if !self.push_path.starts_with('/') || !self.pull_path.starts_with('/') {
            return Err(Error::InvalidInput(
                "push_path and pull_path must start with '/'".into(),
            ));
        }
        if self.push_interval_secs == 0 || self.token_poll_interval_ms == 0 {
            return Err(Error::InvalidInput(
                "push and token poll intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn device_id(&self) -> &str {
        self.device_id.as_deref().unwrap_or_default()
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_delays_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        )
    }

    pub fn pull_settings(&self) -> PullSettings {
        PullSettings {
            path: self.pull_path.clone(),
            min_interval: Duration::from_millis(self.pull_min_interval_ms),
        }
    }

    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            push_interval: Duration::from_secs(self.push_interval_secs),
            push_debounce: Duration::from_millis(self.push_debounce_ms),
            token_poll_interval: Duration::from_millis(self.token_poll_interval_ms),
            token_poll_timeout: Duration::from_millis(self.token_poll_timeout_ms),
        }
    }
}

fn duration_millis(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_push_retry_budget() {
        let config = SyncConfig::default();
        assert_eq!(
            config.retry_policy().delays(),
            &[
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert_eq!(config.push_path, "/api/sync/pets/push");
    }

    #[test]
    fn from_json_fills_defaults_and_trims() {
        let config = SyncConfig::from_json(
            r#"{ "api_base_url": " https://api.example.com/ ", "device_id": "dev-1" }"#,
        )
        .unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(config.push_interval_secs, 30);
        config.validate().unwrap();
    }

    #[test]
    fn from_json_rejects_unknown_fields() {
        let error = SyncConfig::from_json(r#"{ "unexpected": true }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn validate_requires_http_base_url_and_device() {
        assert!(SyncConfig::default().validate().is_err());
        assert!(SyncConfig::new("api.example.com", "dev").validate().is_err());
        assert!(SyncConfig::new("https://api.example.com", "dev")
            .validate()
            .is_ok());

        let mut missing_device = SyncConfig::new("https://api.example.com", "dev");
        missing_device.device_id = None;
        assert!(missing_device.validate().is_err());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let config = SyncConfig::new("https://file.example.com", "file-device")
            .with_env_overrides(|key| match key {
                ENV_API_BASE_URL => Some("https://env.example.com".to_string()),
                ENV_DEVICE_ID => Some("   ".to_string()),
                _ => None,
            });
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://env.example.com")
        );
        assert_eq!(config.device_id(), "file-device");
    }

    #[test]
    fn derived_views_carry_intervals() {
        let config = SyncConfig::default()
            .with_push_interval(Duration::from_secs(10))
            .with_pull_min_interval(Duration::from_secs(2));
        assert_eq!(config.scheduler_config().push_interval, Duration::from_secs(10));
        assert_eq!(config.pull_settings().min_interval, Duration::from_secs(2));
    }
}
