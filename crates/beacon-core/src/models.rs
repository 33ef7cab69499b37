//! Domain models and wire records.
//!
//! The server is inconsistent about field casing: the bulk list endpoint and
//! the push hub may send `createdAt` or `CreatedAt`, `isRead` or `IsRead`,
//! and so on. [`NotificationRecord`] is the single place that absorbs this.
//! Everything past it works with the normalized [`Notification`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

// =============================================================================
// CATEGORY
// =============================================================================

/// Closed set of notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    /// A customer asked for a quote.
    RequestForQuote,
    /// Someone applied to a posted job.
    JobApplication,
    /// Platform/system message.
    #[default]
    System,
    /// Something needs attention.
    Alert,
}

impl NotificationCategory {
    /// Map a raw wire tag onto the closed set.
    ///
    /// Tags are compared lower-cased. Absent or unrecognized tags fall back to
    /// [`NotificationCategory::System`].
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(raw) = tag else {
            return Self::System;
        };
        match raw.trim().to_lowercase().as_str() {
            "rfq" | "quote" | "request-for-quote" | "requestforquote" => Self::RequestForQuote,
            "job" | "application" | "job-application" | "jobapplication" => Self::JobApplication,
            "system" => Self::System,
            "alert" => Self::Alert,
            other => {
                tracing::debug!(tag = other, "Unrecognized notification category, using system");
                Self::System
            }
        }
    }

    /// Canonical lower-case tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestForQuote => "request-for-quote",
            Self::JobApplication => "job-application",
            Self::System => "system",
            Self::Alert => "alert",
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// NOTIFICATION
// =============================================================================

/// One server-originated notification as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Server-assigned identity, unique within the store.
    pub id: i64,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Monotonic: once true it stays true for the session.
    pub is_read: bool,
    /// Route to navigate to on click-through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Notification as it appears on the wire, in either casing convention.
///
/// `id`, `title` and `createdAt` are required: a record that carries none of
/// the accepted spellings for one of them is rejected with
/// [`Error::MalformedRecord`] instead of being filled with defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRecord {
    #[serde(alias = "Id")]
    pub id: i64,
    #[serde(default, rename = "type", alias = "Type")]
    pub category: Option<String>,
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
    #[serde(
        rename = "createdAt",
        alias = "CreatedAt",
        deserialize_with = "deserialize_timestamp"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "isRead", alias = "IsRead")]
    pub is_read: Option<bool>,
    #[serde(default, alias = "Link")]
    pub link: Option<String>,
}

impl NotificationRecord {
    /// Decode a JSON payload, accepting both casing conventions.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        NotificationRecord::deserialize(value).map_err(|e| Error::MalformedRecord(e.to_string()))
    }

    /// Normalize into the store's representation.
    pub fn into_notification(self) -> Notification {
        Notification {
            id: self.id,
            category: NotificationCategory::from_tag(self.category.as_deref()),
            title: self.title,
            message: self.message.unwrap_or_default(),
            created_at: self.created_at,
            is_read: self.is_read.unwrap_or(false),
            link: self.link.filter(|l| !l.trim().is_empty()),
        }
    }
}

impl Notification {
    /// Decode and normalize a wire payload in one step.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        NotificationRecord::from_json(value).map(NotificationRecord::into_notification)
    }
}

/// Parse a server timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive ISO-8601 date-time which is
/// taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
}

// =============================================================================
// VERSION MARKER
// =============================================================================

/// Deployed build marker served by the version endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VersionMarker {
    /// Opaque build hash; the only field compared.
    pub hash: String,
    /// Build time as the server reports it. Informational only.
    #[serde(default)]
    pub timestamp: Option<JsonValue>,
}
