//! Collaborator traits.
//!
//! The runtime components never talk to reqwest or the host shell directly;
//! they hold these traits so tests can substitute in-memory doubles.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Notification, VersionMarker};

// =============================================================================
// HTTP COLLABORATORS
// =============================================================================

/// REST surface of the notifications resource.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Fetch the full current list, in server order.
    async fn list(&self) -> Result<Vec<Notification>>;

    /// Confirm one notification as read.
    async fn mark_read(&self, id: i64) -> Result<()>;

    /// Confirm every notification as read.
    async fn mark_all_read(&self) -> Result<()>;
}

/// Source of the currently deployed build marker.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Fetch the marker, bypassing intermediary caches.
    async fn fetch(&self) -> Result<VersionMarker>;
}

// =============================================================================
// HOST SHELL
// =============================================================================

/// Navigation primitives of the host shell.
pub trait Navigator: Send + Sync {
    /// Full reload: discard all in-memory client state and start over.
    fn reload(&self);

    /// Route navigation for a notification click-through.
    fn navigate(&self, route: &str);
}
