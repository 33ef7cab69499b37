//! # beacon-core
//!
//! Core types, traits, and wire normalization for the beacon live sync client.
//!
//! This crate holds everything the runtime components share but that does not
//! itself schedule work: the notification model and its dual-casing wire
//! parser, connection and store event types, relative-time formatting, and
//! the collaborator traits the runtime talks to (HTTP API, version source,
//! navigation).

pub mod defaults;
pub mod error;
pub mod events;
pub mod models;
pub mod temporal;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{ConnectionState, ExecutionContext, PushEvent, StoreEvent};
pub use models::{Notification, NotificationCategory, NotificationRecord, VersionMarker};
pub use temporal::format_relative_time;
pub use traits::{Navigator, NotificationApi, VersionSource};
