//! Appointment records and the drafts sync produces for them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag stored on appointments created by calendar sync.
pub const IMPORT_SOURCE: &str = "calendar_sync";

/// A normalized event entry, ready for matching and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub booking_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub booking_time: NaiveTime,
    pub duration_minutes: u32,
    pub notes: String,
    pub customer_id: Option<String>,
    pub external_id: String,
    pub connection_id: String,
    pub source: String,
}

/// Lifecycle status of an appointment. Sync sets it on insert only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// A persisted appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub provider_id: String,
    pub customer_id: Option<String>,
    pub booking_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub booking_time: NaiveTime,
    pub duration_minutes: u32,
    pub notes: String,
    pub status: AppointmentStatus,
    pub source: String,
    pub external_id: Option<String>,
    pub connection_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting an appointment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub provider_id: String,
    pub status: AppointmentStatus,
    pub draft: AppointmentDraft,
}

impl NewAppointment {
    /// An imported appointment starts out confirmed.
    pub fn imported(draft: AppointmentDraft, provider_id: &str) -> Self {
        NewAppointment {
            provider_id: provider_id.to_string(),
            status: AppointmentStatus::Confirmed,
            draft,
        }
    }
}

/// Fields sync is allowed to overwrite on an existing appointment.
///
/// Status, provider and identity are never touched by sync.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentChanges {
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub duration_minutes: u32,
    pub notes: String,
    /// `None` leaves the stored customer as it is.
    pub customer_id: Option<Option<String>>,
}

impl AppointmentChanges {
    /// The same changes without touching the stored customer.
    pub fn keeping_customer(self) -> Self {
        AppointmentChanges {
            customer_id: None,
            ..self
        }
    }
}

impl From<&AppointmentDraft> for AppointmentChanges {
    fn from(draft: &AppointmentDraft) -> Self {
        AppointmentChanges {
            booking_date: draft.booking_date,
            booking_time: draft.booking_time,
            duration_minutes: draft.duration_minutes,
            notes: draft.notes.clone(),
            customer_id: Some(draft.customer_id.clone()),
        }
    }
}

impl Appointment {
    pub fn apply(&mut self, changes: AppointmentChanges, at: DateTime<Utc>) {
        self.booking_date = changes.booking_date;
        self.booking_time = changes.booking_time;
        self.duration_minutes = changes.duration_minutes;
        self.notes = changes.notes;
        if let Some(customer_id) = changes.customer_id {
            self.customer_id = customer_id;
        }
        self.updated_at = at;
    }
}

/// `HH:MM` booking times.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
