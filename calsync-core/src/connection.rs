//! Calendar connections: a provider's link to an external feed.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A provider's subscription to an external calendar feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarConnection {
    pub id: String,
    pub owner_id: String,
    /// Source platform tag ("google", "icloud", "outlook", ...)
    #[serde(default = "default_platform")]
    pub platform: String,
    pub feed_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// IANA zone for booking dates/times; engine default when unset.
    #[serde(default)]
    pub timezone: Option<String>,

    // Written by the status recorder only
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync_status: Option<SyncStatus>,
    #[serde(default)]
    pub last_sync_error: Option<String>,
    #[serde(default)]
    pub imported_count: u64,
}

fn default_platform() -> String {
    "other".to_string()
}

fn default_active() -> bool {
    true
}

impl CalendarConnection {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, feed_url: Option<String>) -> Self {
        CalendarConnection {
            id: id.into(),
            owner_id: owner_id.into(),
            platform: default_platform(),
            feed_url,
            active: true,
            timezone: None,
            last_synced_at: None,
            last_sync_status: None,
            last_sync_error: None,
            imported_count: 0,
        }
    }

    /// The configured feed address, if it is non-blank.
    pub fn feed_address(&self) -> Option<&str> {
        self.feed_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// The connection's own zone, if set and known.
    pub fn zone(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|tz| tz.parse().ok())
    }

    /// Apply the outcome of a sync run.
    ///
    /// The cumulative imported count only ever grows.
    pub fn apply_sync(&mut self, record: &SyncRecord) {
        self.last_synced_at = Some(record.synced_at);
        self.last_sync_status = Some(record.status);
        self.last_sync_error = record.error.clone();
        self.imported_count = self.imported_count.saturating_add(record.imported);
    }
}

/// Outcome of the most recent sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// What the status recorder writes back onto a connection after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub synced_at: DateTime<Utc>,
    pub status: SyncStatus,
    pub error: Option<String>,
    /// Appointments created by this run
    pub imported: u64,
}
