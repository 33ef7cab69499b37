//! Connection manager: one logical push channel, a state machine on top of
//! it, and named event subscriptions.
//!
//! Two retry tiers cooperate:
//!
//! 1. The transport re-establishes a channel that drops mid-session and
//!    reports that as `Reconnecting` → `Connected` (or `Disconnected` once it
//!    gives up).
//! 2. The manager re-runs a start attempt that failed outright, forever, on
//!    the cadence of its [`RetryPolicy`].
//!
//! Failures are logged and retried; they are never returned to callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use beacon_core::{ConnectionState, PushEvent};

use crate::backoff::RetryPolicy;
use crate::transport::{PushTransport, SessionCloser, TransportSignal};

// =============================================================================
// LISTENERS
// =============================================================================

/// Handler for one named push event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &PushEvent);
}

/// Adapter turning a plain closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&PushEvent) + Send + Sync,
{
    async fn handle(&self, event: &PushEvent) {
        (self.0)(event)
    }
}

/// Wrap a closure as a shareable event handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&PushEvent) + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Registration handle returned by [`ConnectionManager::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerTable = HashMap<String, Vec<(ListenerId, Arc<dyn EventHandler>)>>;

// =============================================================================
// MANAGER
// =============================================================================

/// Outcome of a single start attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartOutcome {
    AlreadyConnected,
    Started,
    /// The transport is mid-reconnect on an existing channel.
    TransportReconnecting,
    /// `stop_connection` ran while the open was in flight.
    Cancelled,
    Failed,
}

struct ActiveSession {
    id: Uuid,
    closer: SessionCloser,
    pump: JoinHandle<()>,
}

struct Inner {
    transport: Arc<dyn PushTransport>,
    retry_policy: RetryPolicy,
    state_tx: watch::Sender<ConnectionState>,
    listeners: RwLock<ListenerTable>,
    next_listener_id: AtomicU64,
    /// Held for the whole start attempt, which serializes concurrent starts.
    /// `stop_connection` never takes it.
    starting: Mutex<()>,
    session: Mutex<Option<ActiveSession>>,
    /// Bumped by every stop; an in-flight open that observes a bump is abandoned.
    stop_epoch: watch::Sender<u64>,
    /// Bumped whenever a session is opened or torn down; a pump whose
    /// generation is stale drops its signals.
    generation: AtomicU64,
    retry_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Owner of the single push channel.
///
/// Cheap to clone; all clones share the same channel, state, and listeners.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager with the default retry policy (fixed 5 s).
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self::with_retry_policy(transport, RetryPolicy::default())
    }

    pub fn with_retry_policy(transport: Arc<dyn PushTransport>, retry_policy: RetryPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (stop_epoch, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                transport,
                retry_policy,
                state_tx,
                listeners: RwLock::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                starting: Mutex::new(()),
                session: Mutex::new(None),
                stop_epoch,
                generation: AtomicU64::new(0),
                retry_task: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Open the push channel.
    ///
    /// Returns `true` when a channel is connected on return, including when
    /// it already was (no second channel is opened). On failure the state
    /// goes back to `Disconnected`, a retry is scheduled, and `false` is
    /// returned.
    #[instrument(skip(self))]
    pub async fn start_connection(&self) -> bool {
        match self.inner.try_start().await {
            StartOutcome::AlreadyConnected | StartOutcome::Started => true,
            StartOutcome::TransportReconnecting | StartOutcome::Cancelled => false,
            StartOutcome::Failed => {
                self.schedule_retry();
                false
            }
        }
    }

    /// Close the channel if one is open, cancel any pending start retry, and
    /// abandon a start attempt that is still opening.
    #[instrument(skip(self))]
    pub async fn stop_connection(&self) {
        self.cancel_retry();
        self.inner.stop_epoch.send_modify(|epoch| *epoch += 1);

        let mut session = self.inner.session.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = session.take() {
            active.closer.close();
            active.pump.abort();
            info!(session_id = %active.id, "Push channel stopped");
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Register `handler` for events named `event_name`.
    ///
    /// Handlers for the same name run in registration order.
    pub async fn add_listener(
        &self,
        event_name: &str,
        handler: Arc<dyn EventHandler>,
    ) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.inner.listeners.write().await;
        listeners
            .entry(event_name.to_string())
            .or_default()
            .push((id, handler));
        debug!(event = event_name, listener = id.0, "Listener registered");
        id
    }

    /// Unregister a listener. No-op if it is not registered under `event_name`.
    pub async fn remove_listener(&self, event_name: &str, id: ListenerId) {
        let mut listeners = self.inner.listeners.write().await;
        if let Some(handlers) = listeners.get_mut(event_name) {
            handlers.retain(|(existing, _)| *existing != id);
            if handlers.is_empty() {
                listeners.remove(event_name);
            }
        }
    }

    /// Number of handlers registered for `event_name`.
    pub async fn listener_count(&self, event_name: &str) -> usize {
        self.inner
            .listeners
            .read()
            .await
            .get(event_name)
            .map_or(0, Vec::len)
    }

    fn schedule_retry(&self) {
        let weak = Arc::downgrade(&self.inner);
        let policy = self.inner.retry_policy.clone();

        let task = tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                let delay = policy.delay_for(attempt);
                info!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Push channel start retry scheduled"
                );
                sleep(delay).await;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.try_start().await != StartOutcome::Failed {
                    return;
                }
                attempt = attempt.saturating_add(1);
            }
        });

        let previous = self
            .inner
            .retry_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_retry(&self) {
        self.inner.cancel_retry();
    }
}

impl Inner {
    async fn try_start(self: &Arc<Self>) -> StartOutcome {
        let mut stop_rx = self.stop_epoch.subscribe();
        let epoch = *stop_rx.borrow_and_update();
        let _starting = self.starting.lock().await;

        let current = *self.state_tx.borrow();
        match current {
            ConnectionState::Connected => return StartOutcome::AlreadyConnected,
            ConnectionState::Reconnecting => return StartOutcome::TransportReconnecting,
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }
        if *stop_rx.borrow() != epoch {
            return StartOutcome::Cancelled;
        }

        self.set_state(ConnectionState::Connecting);
        let opened = tokio::select! {
            result = self.transport.open() => result,
            _ = stop_rx.changed() => {
                debug!("Push channel start abandoned by stop");
                self.set_state(ConnectionState::Disconnected);
                return StartOutcome::Cancelled;
            }
        };

        match opened {
            Ok(opened) => {
                let mut session = self.session.lock().await;
                if *self.stop_epoch.borrow() != epoch {
                    opened.closer.close();
                    debug!("Push channel opened after stop, closing it");
                    self.set_state(ConnectionState::Disconnected);
                    return StartOutcome::Cancelled;
                }
                if let Some(stale) = session.take() {
                    stale.closer.close();
                    stale.pump.abort();
                }

                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let id = Uuid::new_v4();
                let pump = tokio::spawn(pump(
                    Arc::downgrade(self),
                    generation,
                    id,
                    opened.signals,
                ));
                *session = Some(ActiveSession {
                    id,
                    closer: opened.closer,
                    pump,
                });
                self.set_state(ConnectionState::Connected);
                info!(session_id = %id, "Push channel connected");
                StartOutcome::Started
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                if *self.stop_epoch.borrow() != epoch {
                    return StartOutcome::Cancelled;
                }
                warn!(error = %e, "Push channel start failed");
                StartOutcome::Failed
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn dispatch(&self, event: &PushEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let listeners = self.listeners.read().await;
            match listeners.get(&event.name) {
                Some(registered) => registered.iter().map(|(_, h)| h.clone()).collect(),
                None => {
                    debug!(event = %event.name, "No listeners for pushed event");
                    return;
                }
            }
        };

        for handler in handlers {
            handler.handle(event).await;
        }
    }

    fn cancel_retry(&self) {
        let pending = self
            .retry_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = pending {
            task.abort();
            debug!("Pending push channel retry cancelled");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_retry();
        if let Some(active) = self.session.get_mut().take() {
            active.closer.close();
            active.pump.abort();
        }
    }
}

/// Forward transport signals for one session, in order.
async fn pump(
    inner: Weak<Inner>,
    generation: u64,
    session_id: Uuid,
    mut signals: mpsc::Receiver<TransportSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if !inner.is_current(generation) {
            debug!(session_id = %session_id, "Ignoring signal from stale session");
            return;
        }

        match signal {
            TransportSignal::Message(event) => inner.dispatch(&event).await,
            TransportSignal::Reconnecting { reason } => {
                warn!(session_id = %session_id, reason = %reason, "Push channel lost, transport reconnecting");
                inner.set_state(ConnectionState::Reconnecting);
            }
            TransportSignal::Reconnected => {
                info!(session_id = %session_id, "Push channel reconnected");
                inner.set_state(ConnectionState::Connected);
            }
            TransportSignal::Closed { reason } => {
                info!(
                    session_id = %session_id,
                    reason = reason.as_deref().unwrap_or("closed by server"),
                    "Push channel closed"
                );
                inner.set_state(ConnectionState::Disconnected);
                return;
            }
        }
    }
}
