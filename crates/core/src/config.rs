//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the session core.
///
/// Deserializable so deployments can load it from a config file; every
/// field has a default matching the observed production values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Connection-attempt budget before recovery gives up.
    pub max_retries: u32,
    /// Base delay for linear retry backoff, in milliseconds.
    pub base_backoff_ms: u64,
    /// Pause between bulk-dispatch items, in milliseconds.
    pub bulk_delay_ms: u64,
    /// Capacity of the internal driver-event channel.
    pub event_buffer: usize,
    /// Client id handed to the bridge's credential store.
    pub client_id: String,
    /// Directory for persisted session credentials (bridge-owned).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Default timeout for readiness waits, in milliseconds.
    pub ready_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 1_000,
            bulk_delay_ms: 2_000,
            event_buffer: 256,
            client_id: "watify-client".to_string(),
            data_dir: None,
            ready_timeout_ms: 60_000,
        }
    }
}

impl SessionConfig {
    /// Sets the connection-attempt budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base retry backoff.
    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Sets the inter-item bulk delay.
    pub fn with_bulk_delay(mut self, delay: Duration) -> Self {
        self.bulk_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the bridge client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the credential directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Base backoff as a [`Duration`].
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    /// Bulk inter-item delay as a [`Duration`].
    pub fn bulk_delay(&self) -> Duration {
        Duration::from_millis(self.bulk_delay_ms)
    }

    /// Readiness-wait timeout as a [`Duration`].
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}
