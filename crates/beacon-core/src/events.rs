//! Event and state types shared between the runtime components.
//!
//! - [`PushEvent`]: one named message delivered by the push channel.
//! - [`ConnectionState`]: the connection manager's observable state.
//! - [`StoreEvent`]: change notifications the store broadcasts to UI observers.

use serde::Serialize;
use serde_json::Value as JsonValue;

// ============================================================================
// Push Event
// ============================================================================

/// A server-pushed message, tagged with the event name it was sent under.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    /// Event name, e.g. `"ReceiveNotification"`.
    pub name: String,
    /// Decoded JSON payload.
    pub payload: JsonValue,
}

impl PushEvent {
    pub fn new(name: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// State of the single logical push channel.
///
/// ```text
/// Disconnected ──start──▶ Connecting ──ok──▶ Connected
///       ▲                     │                 │  ▲
///       │                    err            drop│  │reconnected
///       │◀────────────────────┘                 ▼  │
///       │◀──────────────closed──────────── Reconnecting
///       │◀──────────────closed─────────────── Connected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// A start attempt is in flight.
    Connecting,
    Connected,
    /// The transport lost the channel and is retrying on its own.
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Store Event
// ============================================================================

/// Change notification emitted by the notification store after each mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    /// The cache was replaced by a bulk load.
    Loaded { count: usize },
    /// A pushed notification was prepended.
    Received { id: i64 },
    /// One notification was marked read locally.
    MarkedRead { id: i64 },
    /// Every notification was marked read locally.
    MarkedAllRead,
}

// ============================================================================
// Execution Context
// ============================================================================

/// Where the client is running.
///
/// The store and the freshness watcher only do work in an interactive
/// session; a prerender/headless pass must not open connections or timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionContext {
    #[default]
    Interactive,
    Prerender,
}

impl ExecutionContext {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        let json = serde_json::to_string(&ConnectionState::Connected).unwrap();
        assert_eq!(json, r#""connected""#);
    }

    #[test]
    fn test_store_event_json() {
        let json = serde_json::to_string(&StoreEvent::Received { id: 12 }).unwrap();
        assert!(json.contains(r#""type":"Received""#));
        assert!(json.contains(r#""id":12"#));

        let json = serde_json::to_string(&StoreEvent::MarkedAllRead).unwrap();
        assert_eq!(json, r#"{"type":"MarkedAllRead"}"#);
    }

    #[test]
    fn test_push_event_new() {
        let event = PushEvent::new("ReceiveNotification", json!({"id": 1}));
        assert_eq!(event.name, "ReceiveNotification");
        assert_eq!(event.payload["id"], 1);
    }

    #[test]
    fn test_execution_context() {
        assert!(ExecutionContext::default().is_interactive());
        assert!(!ExecutionContext::Prerender.is_interactive());
    }
}
