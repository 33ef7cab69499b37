//! Centralized default constants for the beacon sync client.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration types in `beacon-sync` start from these and let environment
//! variables override them.

// =============================================================================
// ENDPOINTS
// =============================================================================

/// Default server base URL.
pub const BASE_URL: &str = "http://127.0.0.1:5000";

/// Notifications REST resource, relative to the base URL.
pub const NOTIFICATIONS_PATH: &str = "/api/notifications";

/// Push hub (SSE) endpoint, relative to the base URL.
pub const HUB_PATH: &str = "/hubs/notifications";

/// Deployed build marker, relative to the base URL.
pub const VERSION_PATH: &str = "/version.json";

/// Query parameter carrying the cache-busting timestamp on version polls.
pub const CACHE_BUST_PARAM: &str = "t";

// =============================================================================
// PUSH CHANNEL
// =============================================================================

/// Event name the server uses for a newly created notification.
pub const NOTIFICATION_EVENT: &str = "ReceiveNotification";

/// Delay before re-attempting a failed connection start (milliseconds).
pub const START_RETRY_DELAY_MS: u64 = 5_000;

/// Floor for a configured start retry delay (milliseconds).
pub const MIN_START_RETRY_DELAY_MS: u64 = 250;

/// Transport-level reconnect schedule during a Reconnecting episode
/// (milliseconds). Once exhausted the transport reports the channel closed.
pub const TRANSPORT_RECONNECT_DELAYS_MS: [u64; 4] = [0, 2_000, 10_000, 30_000];

/// Capacity of the transport signal channel between reader task and pump.
pub const TRANSPORT_SIGNAL_CAPACITY: usize = 64;

/// Longest SSE line the parser buffers (bytes). Longer lines are dropped
/// along with the frame they belong to.
pub const MAX_SSE_LINE_BYTES: usize = 1024 * 1024;

// =============================================================================
// STORE
// =============================================================================

/// Broadcast capacity for store change events.
pub const STORE_EVENT_CAPACITY: usize = 256;

// =============================================================================
// FRESHNESS WATCHER
// =============================================================================

/// Interval between version marker polls (seconds).
pub const VERSION_POLL_INTERVAL_SECS: u64 = 30;
