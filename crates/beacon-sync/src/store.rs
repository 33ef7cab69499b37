//! Notification store: the client-side source of truth for notifications.
//!
//! All cache mutations (bulk replace, pushed insert, mark-read, mark-all-read)
//! run under a single write guard, so each one is atomic with respect to the
//! others. Server confirmations are issued after the guard is released.
//!
//! Mark-read is optimistic and is **not** rolled back when the server call
//! fails. The divergence that leaves behind can be repaired by
//! [`NotificationStore::reconcile`], which the periodic reconciliation timer
//! drives when enabled.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use beacon_core::{
    defaults, format_relative_time, ExecutionContext, Navigator, Notification, NotificationApi,
    PushEvent, StoreEvent,
};

use crate::connection::{ConnectionManager, EventHandler, ListenerId};

/// Result of a mark-read style mutation.
///
/// This is informational: the local state is already updated either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The server acknowledged the change.
    Confirmed,
    /// The server call failed; the optimistic local state was kept.
    Unconfirmed,
    /// Nothing to do (unknown notification id).
    Skipped,
}

struct StoreInner {
    api: Arc<dyn NotificationApi>,
    connection: ConnectionManager,
    context: ExecutionContext,
    cache: RwLock<VecDeque<Notification>>,
    events: broadcast::Sender<StoreEvent>,
    listener: Mutex<Option<ListenerId>>,
}

/// Client-side cache of notifications, kept live by the push channel.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

impl NotificationStore {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        connection: ConnectionManager,
        context: ExecutionContext,
    ) -> Self {
        let (events, _) = broadcast::channel(defaults::STORE_EVENT_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                api,
                connection,
                context,
                cache: RwLock::new(VecDeque::new()),
                events,
                listener: Mutex::new(None),
            }),
        }
    }

    /// Load current state, subscribe to pushed notifications, and open the
    /// push channel.
    ///
    /// Does nothing outside an interactive session. Calling it again reloads
    /// and restarts the channel but never registers a second handler.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        if !self.inner.context.is_interactive() {
            debug!("Non-interactive context, notification store stays idle");
            return;
        }

        self.load().await;

        {
            let mut listener = self.inner.listener.lock().await;
            if listener.is_none() {
                let handler = Arc::new(PushedNotificationHandler {
                    store: Arc::downgrade(&self.inner),
                });
                let id = self
                    .inner
                    .connection
                    .add_listener(defaults::NOTIFICATION_EVENT, handler)
                    .await;
                *listener = Some(id);
            }
        }

        self.inner.connection.start_connection().await;
    }

    /// Fetch the full list and replace the cache wholesale.
    ///
    /// On failure the cache is left untouched and `false` is returned. There
    /// is no retry.
    #[instrument(skip(self))]
    pub async fn load(&self) -> bool {
        let fetched = match self.inner.api.list().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Failed to load notifications");
                return false;
            }
        };

        let fetched = dedupe_by_id(fetched);
        let count = fetched.len();
        {
            let mut cache = self.inner.cache.write().await;
            *cache = fetched.into();
        }
        info!(result_count = count, "Notifications loaded");
        self.emit(StoreEvent::Loaded { count });
        true
    }

    /// Merge one pushed record: normalize it and put it in front.
    ///
    /// Malformed records are logged and dropped. A record whose id is already
    /// cached is ignored so ids stay unique and read flags never regress.
    pub async fn receive(&self, payload: &JsonValue) {
        let notification = match Notification::from_json(payload) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Dropping malformed pushed notification");
                return;
            }
        };
        let id = notification.id;

        {
            let mut cache = self.inner.cache.write().await;
            if cache.iter().any(|n| n.id == id) {
                debug!(notification_id = id, "Pushed notification already cached, ignoring");
                return;
            }
            cache.push_front(notification);
        }
        debug!(notification_id = id, "Pushed notification received");
        self.emit(StoreEvent::Received { id });
    }

    /// Mark one notification read locally, then confirm with the server.
    #[instrument(skip(self))]
    pub async fn mark_as_read(&self, id: i64) -> Confirmation {
        let found = {
            let mut cache = self.inner.cache.write().await;
            match cache.iter_mut().find(|n| n.id == id) {
                Some(notification) => {
                    notification.is_read = true;
                    true
                }
                None => false,
            }
        };
        if !found {
            debug!(notification_id = id, "Mark-as-read for unknown notification ignored");
            return Confirmation::Skipped;
        }
        self.emit(StoreEvent::MarkedRead { id });

        match self.inner.api.mark_read(id).await {
            Ok(()) => Confirmation::Confirmed,
            Err(e) => {
                warn!(
                    notification_id = id,
                    error = %e,
                    "Mark-as-read not confirmed by server, keeping local state"
                );
                Confirmation::Unconfirmed
            }
        }
    }

    /// Mark every notification read locally, then confirm with one server call.
    #[instrument(skip(self))]
    pub async fn mark_all_as_read(&self) -> Confirmation {
        {
            let mut cache = self.inner.cache.write().await;
            for notification in cache.iter_mut() {
                notification.is_read = true;
            }
        }
        self.emit(StoreEvent::MarkedAllRead);

        match self.inner.api.mark_all_read().await {
            Ok(()) => Confirmation::Confirmed,
            Err(e) => {
                warn!(
                    error = %e,
                    "Mark-all-as-read not confirmed by server, keeping local state"
                );
                Confirmation::Unconfirmed
            }
        }
    }

    /// Click-through: mark read and navigate to the notification's target.
    ///
    /// Returns the route navigated to, if any.
    pub async fn open(&self, id: i64, navigator: &dyn Navigator) -> Option<String> {
        let link = {
            let cache = self.inner.cache.read().await;
            let notification = cache.iter().find(|n| n.id == id)?;
            notification.link.clone()
        };

        self.mark_as_read(id).await;
        if let Some(route) = &link {
            navigator.navigate(route);
        }
        link
    }

    /// Re-fetch authoritative state and repair divergence.
    ///
    /// Local read flags survive the merge (read never regresses). Ids read
    /// locally but still unread on the server get their confirmation
    /// re-sent. Pushed notifications the server list does not contain yet
    /// are kept in front.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> bool {
        let server = match self.inner.api.list().await {
            Ok(list) => dedupe_by_id(list),
            Err(e) => {
                warn!(error = %e, "Reconciliation fetch failed");
                return false;
            }
        };

        let (divergent, count) = {
            let mut cache = self.inner.cache.write().await;
            let locally_read: HashSet<i64> =
                cache.iter().filter(|n| n.is_read).map(|n| n.id).collect();
            let server_ids: HashSet<i64> = server.iter().map(|n| n.id).collect();

            let mut divergent = Vec::new();
            let mut merged: VecDeque<Notification> = cache
                .iter()
                .filter(|n| !server_ids.contains(&n.id))
                .cloned()
                .collect();
            for mut notification in server {
                if locally_read.contains(&notification.id) && !notification.is_read {
                    notification.is_read = true;
                    divergent.push(notification.id);
                }
                merged.push_back(notification);
            }
            *cache = merged;
            (divergent, cache.len())
        };

        info!(
            result_count = count,
            divergent = divergent.len(),
            "Notifications reconciled"
        );
        self.emit(StoreEvent::Loaded { count });

        for id in divergent {
            if let Err(e) = self.inner.api.mark_read(id).await {
                warn!(notification_id = id, error = %e, "Re-confirming mark-as-read failed");
            }
        }
        true
    }

    /// Run [`reconcile`](Self::reconcile) every `interval` until the handle is dropped.
    pub fn start_reconciliation(&self, interval: Duration) -> ReconcileHandle {
        let store = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = store.upgrade() else {
                    return;
                };
                NotificationStore { inner }.reconcile().await;
            }
        });
        ReconcileHandle { task }
    }

    /// Count of unread notifications, computed from the cache.
    pub async fn unread_count(&self) -> usize {
        self.inner
            .cache
            .read()
            .await
            .iter()
            .filter(|n| !n.is_read)
            .count()
    }

    /// Snapshot of the cache in display order.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.cache.read().await.iter().cloned().collect()
    }

    pub async fn get(&self, id: i64) -> Option<Notification> {
        self.inner
            .cache
            .read()
            .await
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.cache.read().await.is_empty()
    }

    /// Receive a [`StoreEvent`] after every mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    /// Human-readable age of `timestamp` relative to now.
    pub fn relative_time(timestamp: DateTime<Utc>) -> String {
        format_relative_time(timestamp, Utc::now())
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.inner.events.send(event);
    }
}

/// Registered with the connection manager for the notification event.
///
/// Holds the store weakly: the manager outliving the store must not keep
/// the cache alive.
struct PushedNotificationHandler {
    store: Weak<StoreInner>,
}

#[async_trait]
impl EventHandler for PushedNotificationHandler {
    async fn handle(&self, event: &PushEvent) {
        if let Some(inner) = self.store.upgrade() {
            NotificationStore { inner }.receive(&event.payload).await;
        }
    }
}

/// Owns the reconciliation timer; dropping it stops the timer.
pub struct ReconcileHandle {
    task: JoinHandle<()>,
}

impl Drop for ReconcileHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn dedupe_by_id(list: Vec<Notification>) -> Vec<Notification> {
    let mut seen = HashSet::with_capacity(list.len());
    let before = list.len();
    let unique: Vec<Notification> = list.into_iter().filter(|n| seen.insert(n.id)).collect();
    if unique.len() != before {
        warn!(
            duplicates = before - unique.len(),
            "Server list contained duplicate notification ids"
        );
    }
    unique
}
