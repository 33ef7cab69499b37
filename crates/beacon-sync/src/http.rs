//! reqwest-backed HTTP collaborators.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, Response};
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use beacon_core::{
    defaults, Error, Notification, NotificationApi, Result, VersionMarker, VersionSource,
};

use crate::config::SyncConfig;

/// Notifications REST resource.
pub struct HttpNotificationApi {
    client: Client,
    resource_url: String,
}

impl HttpNotificationApi {
    pub fn new(client: Client, resource_url: impl Into<String>) -> Self {
        Self {
            client,
            resource_url: resource_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(client: Client, config: &SyncConfig) -> Self {
        Self::new(client, config.notifications_url())
    }

    async fn post_empty(&self, url: String) -> Result<()> {
        let response = self.client.post(&url).send().await?;
        ensure_success(response, &url).await.map(|_| ())
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Notification>> {
        let response = self.client.get(&self.resource_url).send().await?;
        let response = ensure_success(response, &self.resource_url).await?;
        let records: Vec<JsonValue> = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse notification list: {e}")))?;

        let total = records.len();
        let mut notifications = Vec::with_capacity(total);
        for record in &records {
            match Notification::from_json(record) {
                Ok(notification) => notifications.push(notification),
                Err(e) => warn!(error = %e, "Skipping malformed notification in list"),
            }
        }
        debug!(
            result_count = notifications.len(),
            skipped = total - notifications.len(),
            "Notification list fetched"
        );
        Ok(notifications)
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, id: i64) -> Result<()> {
        self.post_empty(format!("{}/{}/read", self.resource_url, id))
            .await
    }

    #[instrument(skip(self))]
    async fn mark_all_read(&self) -> Result<()> {
        self.post_empty(format!("{}/read-all", self.resource_url))
            .await
    }
}

/// Version marker endpoint, cache-busted on every request.
pub struct HttpVersionSource {
    client: Client,
    url: String,
}

impl HttpVersionSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(client: Client, config: &SyncConfig) -> Self {
        Self::new(client, config.version_url())
    }
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    async fn fetch(&self) -> Result<VersionMarker> {
        let stamp = Utc::now().timestamp_millis().to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[(defaults::CACHE_BUST_PARAM, stamp.as_str())])
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        let response = ensure_success(response, &self.url).await?;
        response
            .json::<VersionMarker>()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse version marker: {e}")))
    }
}

async fn ensure_success(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), url, body = %body, "Request rejected");
    Err(Error::Status {
        status: status.as_u16(),
        url: url.to_string(),
    })
}
