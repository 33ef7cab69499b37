//! Composition root: wires configuration into the three runtime components.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use beacon_core::{Navigator, Result};

use crate::config::SyncConfig;
use crate::connection::ConnectionManager;
use crate::freshness::{FreshnessWatcher, WatcherHandle};
use crate::http::{HttpNotificationApi, HttpVersionSource};
use crate::sse::SseTransport;
use crate::store::{NotificationStore, ReconcileHandle};

/// One client session: connection, store and freshness watcher.
///
/// A full reload means dropping this value and building a new one from the
/// same config; nothing survives across instances.
pub struct SyncClient {
    config: SyncConfig,
    navigator: Arc<dyn Navigator>,
    connection: ConnectionManager,
    store: NotificationStore,
    version_source: Arc<HttpVersionSource>,
    watcher: Option<WatcherHandle>,
    reconciler: Option<ReconcileHandle>,
}

impl SyncClient {
    pub fn new(config: SyncConfig, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let http = config.http_client()?;

        let transport = SseTransport::new(http.clone(), config.hub_url())
            .with_reconnect_delays(config.transport_reconnect_delays());
        let connection =
            ConnectionManager::with_retry_policy(Arc::new(transport), config.retry_policy.clone());

        let api = Arc::new(HttpNotificationApi::from_config(http.clone(), &config));
        let store = NotificationStore::new(api, connection.clone(), config.context);
        let version_source = Arc::new(HttpVersionSource::from_config(http, &config));

        Ok(Self {
            config,
            navigator,
            connection,
            store,
            version_source,
            watcher: None,
            reconciler: None,
        })
    }

    /// Start the timers, then load notifications and open the push channel.
    ///
    /// The freshness watcher and reconciliation timer run on their own; they
    /// are started first so a push hub that never answers cannot hold them
    /// back. Returns once the initial load and the first start attempt are
    /// done, which can take as long as the hub takes to answer.
    pub async fn start(&mut self) {
        info!(base_url = %self.config.base_url, "Starting sync client");

        if self.watcher.is_none() {
            self.watcher = FreshnessWatcher::new(self.version_source.clone(), self.navigator.clone())
                .with_poll_interval(self.config.version_poll_interval())
                .with_context(self.config.context)
                .start_polling();
        }

        if self.reconciler.is_none() && self.config.context.is_interactive() {
            if let Some(secs) = self.config.reconcile_interval_secs {
                self.reconciler = Some(self.store.start_reconciliation(Duration::from_secs(secs)));
            }
        }

        self.store.initialize().await;
    }

    /// Stop timers and close the push channel.
    pub async fn shutdown(&mut self) {
        self.watcher.take();
        self.reconciler.take();
        self.connection.stop_connection().await;
        info!("Sync client stopped");
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}
