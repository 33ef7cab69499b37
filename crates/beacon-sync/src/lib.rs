//! # beacon-sync
//!
//! Live state synchronization for the dashboard client.
//!
//! - [`ConnectionManager`]: owns the single push channel, its state machine,
//!   start retries, and named event subscriptions.
//! - [`NotificationStore`]: optimistic client-side cache of notifications,
//!   kept live by pushed events.
//! - [`FreshnessWatcher`]: polls the deployed build marker and triggers one
//!   full reload when it changes.
//!
//! [`SyncClient`] wires all three from a [`SyncConfig`].

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod freshness;
pub mod http;
pub mod sse;
pub mod store;
pub mod transport;

pub use backoff::RetryPolicy;
pub use client::SyncClient;
pub use config::SyncConfig;
pub use connection::{handler_fn, ConnectionManager, EventHandler, ListenerId};
pub use freshness::{FreshnessWatcher, WatcherHandle};
pub use http::{HttpNotificationApi, HttpVersionSource};
pub use sse::{SseParser, SseTransport};
pub use store::{Confirmation, NotificationStore, ReconcileHandle};
pub use transport::{PushTransport, SessionCloser, TransportSession, TransportSignal};

// Re-export core types for convenience
pub use beacon_core::{
    ConnectionState, Error, ExecutionContext, Navigator, Notification, NotificationCategory,
    PushEvent, Result, StoreEvent,
};
