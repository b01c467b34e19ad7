//! Event entries as read from an external calendar feed.
//!
//! These are transient: the parser produces them, the normalizer turns them
//! into appointment drafts, and they are discarded afterwards.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One entry of a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub uid: String,
    pub kind: EventKind,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
}

impl ExternalEvent {
    /// A bare event entry with only its identifier set.
    pub fn new(uid: impl Into<String>) -> Self {
        ExternalEvent {
            uid: uid.into(),
            kind: EventKind::Event,
            summary: None,
            description: None,
            start: None,
            end: None,
        }
    }

    pub fn is_event(&self) -> bool {
        self.kind == EventKind::Event
    }
}

/// Component kind of a feed entry. Only `Event` entries become appointments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Event,
    Other(String),
}

impl EventKind {
    /// Map an iCalendar component name (`VEVENT`, `VTODO`, ...) to a kind.
    pub fn from_component(name: &str) -> Self {
        if name.eq_ignore_ascii_case("VEVENT") {
            EventKind::Event
        } else {
            EventKind::Other(name.to_ascii_uppercase())
        }
    }
}

/// A date or date-time value in any of the forms a feed can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    /// All-day value (`VALUE=DATE`)
    Date(NaiveDate),
    /// Absolute instant (`...Z`)
    DateTimeUtc(DateTime<Utc>),
    /// Local time without a zone; interpreted in the connection's zone
    DateTimeFloating(NaiveDateTime),
    /// Local time in a named zone (`TZID=...`)
    DateTimeZoned {
        datetime: NaiveDateTime,
        tzid: String,
    },
}

impl EventTime {
    /// Resolve to an absolute instant.
    ///
    /// Floating values, all-day dates and zoned values whose TZID is not a
    /// known IANA name are read as local time in `local`. Returns `None` for
    /// local times that fall into a DST gap.
    pub fn resolve(&self, local: Tz) -> Option<DateTime<Utc>> {
        match self {
            EventTime::DateTimeUtc(dt) => Some(*dt),
            EventTime::DateTimeFloating(naive) => local_to_utc(local, naive),
            EventTime::DateTimeZoned { datetime, tzid } => {
                let zone = tzid.parse::<Tz>().unwrap_or(local);
                local_to_utc(zone, datetime)
            }
            EventTime::Date(date) => local_to_utc(local, &date.and_hms_opt(0, 0, 0)?),
        }
    }
}

/// Ambiguous local times (DST overlap) take the earlier instant.
fn local_to_utc(zone: Tz, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M UTC")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} {}", datetime.format("%Y-%m-%d %H:%M"), tzid)
            }
        }
    }
}
