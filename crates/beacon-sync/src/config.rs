//! Client configuration.

use std::time::Duration;

use beacon_core::{defaults, Error, ExecutionContext, Result};

use crate::backoff::RetryPolicy;

/// Configuration for the sync runtime.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server origin, e.g. `https://admin.example.com`.
    pub base_url: String,
    /// Notifications REST resource path.
    pub notifications_path: String,
    /// Push hub (SSE) path.
    pub hub_path: String,
    /// Version marker path.
    pub version_path: String,
    /// Cadence of manager-level start retries.
    pub retry_policy: RetryPolicy,
    /// Transport reconnect schedule in milliseconds.
    pub transport_reconnect_delays_ms: Vec<u64>,
    /// Version poll interval in seconds.
    pub version_poll_interval_secs: u64,
    /// Periodic reconciliation interval in seconds; `None` disables it.
    pub reconcile_interval_secs: Option<u64>,
    /// Per-request timeout in seconds; `None` leaves it to the transport.
    pub request_timeout_secs: Option<u64>,
    /// Interactive session or prerender pass.
    pub context: ExecutionContext,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            notifications_path: defaults::NOTIFICATIONS_PATH.to_string(),
            hub_path: defaults::HUB_PATH.to_string(),
            version_path: defaults::VERSION_PATH.to_string(),
            retry_policy: RetryPolicy::default(),
            transport_reconnect_delays_ms: defaults::TRANSPORT_RECONNECT_DELAYS_MS.to_vec(),
            version_poll_interval_secs: defaults::VERSION_POLL_INTERVAL_SECS,
            reconcile_interval_secs: None,
            request_timeout_secs: None,
            context: ExecutionContext::Interactive,
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `BEACON_BASE_URL` | `http://127.0.0.1:5000` | Server origin |
    /// | `BEACON_NOTIFICATIONS_PATH` | `/api/notifications` | REST resource |
    /// | `BEACON_HUB_PATH` | `/hubs/notifications` | SSE push endpoint |
    /// | `BEACON_VERSION_PATH` | `/version.json` | Build marker |
    /// | `BEACON_RETRY_DELAY_MS` | `5000` | Start retry delay (initial delay when exponential), at least 250 |
    /// | `BEACON_RETRY_MAX_DELAY_MS` | unset | If set, retries back off exponentially up to this |
    /// | `BEACON_VERSION_POLL_SECS` | `30` | Version poll interval |
    /// | `BEACON_RECONCILE_SECS` | unset | Periodic reconciliation interval |
    /// | `BEACON_REQUEST_TIMEOUT_SECS` | unset | HTTP request timeout |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = env_string("BEACON_BASE_URL").unwrap_or(defaults.base_url);
        let notifications_path =
            env_string("BEACON_NOTIFICATIONS_PATH").unwrap_or(defaults.notifications_path);
        let hub_path = env_string("BEACON_HUB_PATH").unwrap_or(defaults.hub_path);
        let version_path = env_string("BEACON_VERSION_PATH").unwrap_or(defaults.version_path);

        let retry_delay_ms = env_parse::<u64>("BEACON_RETRY_DELAY_MS")
            .unwrap_or(defaults::START_RETRY_DELAY_MS)
            .max(defaults::MIN_START_RETRY_DELAY_MS);
        let retry_policy = match env_parse::<u64>("BEACON_RETRY_MAX_DELAY_MS") {
            Some(max_ms) => RetryPolicy::Exponential {
                initial_ms: retry_delay_ms,
                max_ms: max_ms.max(retry_delay_ms),
                factor: 2,
            },
            None => RetryPolicy::Fixed {
                delay_ms: retry_delay_ms,
            },
        };

        let version_poll_interval_secs = env_parse::<u64>("BEACON_VERSION_POLL_SECS")
            .unwrap_or(defaults::VERSION_POLL_INTERVAL_SECS)
            .max(1);

        Self {
            base_url,
            notifications_path,
            hub_path,
            version_path,
            retry_policy,
            transport_reconnect_delays_ms: defaults.transport_reconnect_delays_ms,
            version_poll_interval_secs,
            reconcile_interval_secs: env_parse::<u64>("BEACON_RECONCILE_SECS").filter(|s| *s > 0),
            request_timeout_secs: env_parse::<u64>("BEACON_REQUEST_TIMEOUT_SECS")
                .filter(|s| *s > 0),
            context: ExecutionContext::Interactive,
        }
    }

    /// Set the server origin.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the start retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the transport reconnect schedule.
    pub fn with_transport_reconnect_delays(mut self, delays_ms: Vec<u64>) -> Self {
        self.transport_reconnect_delays_ms = delays_ms;
        self
    }

    /// Set the version poll interval.
    pub fn with_version_poll_interval(mut self, secs: u64) -> Self {
        self.version_poll_interval_secs = secs;
        self
    }

    /// Enable periodic reconciliation.
    pub fn with_reconcile_interval(mut self, secs: u64) -> Self {
        self.reconcile_interval_secs = Some(secs);
        self
    }

    /// Set the execution context.
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn notifications_url(&self) -> String {
        join_url(&self.base_url, &self.notifications_path)
    }

    pub fn hub_url(&self) -> String {
        join_url(&self.base_url, &self.hub_path)
    }

    pub fn version_url(&self) -> String {
        join_url(&self.base_url, &self.version_path)
    }

    pub fn version_poll_interval(&self) -> Duration {
        Duration::from_secs(self.version_poll_interval_secs)
    }

    pub fn transport_reconnect_delays(&self) -> Vec<Duration> {
        self.transport_reconnect_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    /// Build the shared HTTP client.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}
