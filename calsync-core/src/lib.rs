//! Synchronization of external calendar feeds into appointments.
//!
//! A [`SyncEngine`] takes a calendar connection, fetches its feed through an
//! ordered list of [`fetch::FeedStrategy`] implementations, parses the iCalendar
//! content, normalizes every event into an [`AppointmentDraft`], attaches a
//! matching customer when one can be found, and upserts the result. The run's
//! outcome is written back onto the connection.
//!
//! Storage lives behind the traits in [`store`]; [`store::memory`] holds
//! in-process implementations.

pub mod appointment;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod fetch;
pub mod ics;
pub mod locator;
pub mod matcher;
pub mod normalize;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod sync;

pub use appointment::{Appointment, AppointmentDraft, AppointmentStatus};
pub use config::SyncConfig;
pub use connection::{CalendarConnection, SyncRecord, SyncStatus};
pub use error::{SkipReason, StoreError, SyncError, SyncResult};
pub use event::{EventTime, ExternalEvent};
pub use fetch::Fetcher;
pub use matcher::{Customer, CustomerMatch};
pub use sync::{Collaborators, SyncEngine, SyncReport, SyncRequest, SyncResponse};
