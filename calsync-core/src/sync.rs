//! The sync run: fetch a connection's feed and reconcile it into appointments.
//!
//! One run per request:
//!
//! ```text
//! Idle → Fetching → Parsing → Normalizing → Matching → Reconciling → Recording → Idle
//!            └──────────────── total fetch failure ─────────────────┘
//! ```
//!
//! Request-level problems (unknown connection, no feed address, a run already
//! in progress) are returned as errors before anything is fetched. Once the
//! connection is known, the run always ends by recording its outcome on the
//! connection, even when the feed could not be fetched.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::connection::CalendarConnection;
use crate::error::{SkipReason, SyncError, SyncResult};
use crate::event::ExternalEvent;
use crate::fetch::{FetchContext, FetchedFeed, Fetcher};
use crate::ics::parse_feed;
use crate::locator::normalize_feed_url;
use crate::matcher::{CustomerMatch, match_customer};
use crate::normalize::{NormalizeContext, normalize};
use crate::reconcile::{CustomerUpdate, ReconcileReport, Reconciler};
use crate::status::{Clock, StatusRecorder, SystemClock};
use crate::store::{AppointmentStore, ConnectionStore, CustomerDirectory};

/// The stores a sync run works against.
#[derive(Clone)]
pub struct Collaborators {
    pub connections: Arc<dyn ConnectionStore>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub appointments: Arc<dyn AppointmentStore>,
}

/// A "sync now" request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default, rename = "connectionId", alias = "connection_id")]
    pub connection_id: Option<String>,
}

impl SyncRequest {
    pub fn for_connection(id: impl Into<String>) -> Self {
        SyncRequest {
            connection_id: Some(id.into()),
        }
    }
}

/// Stage of a sync run, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Fetching,
    Parsing,
    Normalizing,
    Matching,
    Reconciling,
    Recording,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Fetching => "fetching",
            SyncPhase::Parsing => "parsing",
            SyncPhase::Normalizing => "normalizing",
            SyncPhase::Matching => "matching",
            SyncPhase::Reconciling => "reconciling",
            SyncPhase::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub connection_id: String,
    pub imported_count: u32,
    pub updated_count: u32,
    pub skipped_count: u32,
    pub errors: Vec<String>,
    /// No event was processed because the feed could not be retrieved.
    pub fetch_failed: bool,
}

impl SyncReport {
    fn completed(connection_id: &str, report: ReconcileReport) -> Self {
        SyncReport {
            connection_id: connection_id.to_string(),
            imported_count: report.imported_count,
            updated_count: report.updated_count,
            skipped_count: report.skipped_count,
            errors: report.errors,
            fetch_failed: false,
        }
    }

    fn fetch_failure(connection_id: &str, error: &SyncError) -> Self {
        SyncReport {
            connection_id: connection_id.to_string(),
            imported_count: 0,
            updated_count: 0,
            skipped_count: 0,
            errors: vec![error.to_string()],
            fetch_failed: true,
        }
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Wire shape of a run's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub imported_count: u32,
    pub updated_count: u32,
    pub skipped_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl From<&SyncReport> for SyncResponse {
    fn from(report: &SyncReport) -> Self {
        SyncResponse {
            success: report.success(),
            imported_count: report.imported_count,
            updated_count: report.updated_count,
            skipped_count: report.skipped_count,
            errors: (!report.errors.is_empty()).then(|| report.errors.clone()),
        }
    }
}

/// Runs syncs. Share it behind an `Arc`; it is safe to call concurrently, and
/// rejects a second run for a connection that is already syncing.
pub struct SyncEngine {
    connections: Arc<dyn ConnectionStore>,
    customers: Arc<dyn CustomerDirectory>,
    reconciler: Reconciler,
    recorder: StatusRecorder,
    fetcher: Fetcher,
    default_timezone: Tz,
    run_deadline: Option<Duration>,
    in_flight: Mutex<HashSet<String>>,
}

impl SyncEngine {
    pub fn new(collaborators: Collaborators, fetcher: Fetcher, config: &SyncConfig) -> SyncResult<Self> {
        Ok(SyncEngine {
            recorder: StatusRecorder::new(collaborators.connections.clone(), Arc::new(SystemClock)),
            reconciler: Reconciler::new(collaborators.appointments),
            connections: collaborators.connections,
            customers: collaborators.customers,
            fetcher,
            default_timezone: config.timezone()?,
            run_deadline: config.run_deadline,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Use `clock` for sync timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.recorder = StatusRecorder::new(self.connections.clone(), clock);
        self
    }

    pub fn is_syncing(&self, connection_id: &str) -> bool {
        lock(&self.in_flight).contains(connection_id)
    }

    /// Handle a "sync now" request.
    pub async fn sync_now(&self, request: &SyncRequest) -> SyncResult<SyncReport> {
        let connection_id = request
            .connection_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(SyncError::MissingConnectionId)?;

        self.sync_connection(connection_id).await
    }

    /// Sync one connection.
    #[tracing::instrument(skip(self))]
    pub async fn sync_connection(&self, connection_id: &str) -> SyncResult<SyncReport> {
        let _guard = InFlight::acquire(&self.in_flight, connection_id)?;

        let connection = self
            .connections
            .get(connection_id)
            .await?
            .ok_or_else(|| SyncError::ConnectionNotFound(connection_id.to_string()))?;

        let feed_address = connection
            .feed_address()
            .ok_or_else(|| SyncError::MissingFeedAddress(connection_id.to_string()))?;

        if !connection.active {
            info!("syncing inactive connection on request");
        }

        let url = normalize_feed_url(feed_address);
        let timezone = connection.zone().unwrap_or(self.default_timezone);

        let mut report = match self.retrieve(&url, &connection).await {
            Ok(events) => self.process(&connection, events, timezone).await,
            Err(e) => {
                warn!(error = %e, "feed could not be retrieved");
                SyncReport::fetch_failure(connection_id, &e)
            }
        };

        debug!(phase = %SyncPhase::Recording, "sync phase");
        if let Err(e) = self
            .recorder
            .record(connection_id, report.imported_count, &report.errors)
            .await
        {
            error!(error = %e, "failed to record sync status");
            report.errors.push(format!("Failed to record sync status: {e}"));
        }

        info!(
            imported = report.imported_count,
            updated = report.updated_count,
            skipped = report.skipped_count,
            errors = report.errors.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Fetch and, when needed, parse the feed.
    async fn retrieve(&self, url: &str, connection: &CalendarConnection) -> SyncResult<Vec<ExternalEvent>> {
        debug!(phase = %SyncPhase::Fetching, %url, "sync phase");
        let ctx = FetchContext {
            connection_id: connection.id.clone(),
            platform: connection.platform.clone(),
        };

        let fetch = self.fetcher.fetch(url, &ctx);
        let feed = match self.run_deadline {
            Some(deadline) => timeout(deadline, fetch).await.map_err(|_| SyncError::FetchFailed {
                reason: format!(
                    "run deadline of {} exceeded",
                    humantime::format_duration(deadline)
                ),
            })??,
            None => fetch.await?,
        };

        Ok(match feed {
            FetchedFeed::Events(events) => events,
            FetchedFeed::Raw(text) => {
                debug!(phase = %SyncPhase::Parsing, bytes = text.len(), "sync phase");
                parse_feed(&text)
            }
        })
    }

    /// Normalize, match and reconcile fetched events.
    async fn process(
        &self,
        connection: &CalendarConnection,
        events: Vec<ExternalEvent>,
        timezone: Tz,
    ) -> SyncReport {
        debug!(phase = %SyncPhase::Normalizing, events = events.len(), "sync phase");
        let ctx = NormalizeContext {
            connection_id: connection.id.clone(),
            timezone,
        };

        let mut skipped = 0u32;
        let mut drafts = Vec::with_capacity(events.len());
        for event in &events {
            match normalize(event, &ctx) {
                Ok(draft) => drafts.push(draft),
                Err(SkipReason::NotAnEvent) => {}
                Err(reason) => {
                    debug!(uid = %event.uid, %reason, "skipping event");
                    skipped += 1;
                }
            }
        }

        debug!(phase = %SyncPhase::Matching, drafts = drafts.len(), "sync phase");
        let (customers, customer_update, directory_error) =
            match self.customers.customers_for_owner(&connection.owner_id).await {
                Ok(customers) => (customers, CustomerUpdate::Overwrite, None),
                Err(e) => {
                    warn!(error = %e, "customer directory unavailable, keeping existing matches");
                    (
                        Vec::new(),
                        CustomerUpdate::Keep,
                        Some(format!("Customer directory unavailable: {e}")),
                    )
                }
            };
        for draft in &mut drafts {
            let matched = match_customer(&draft.notes, &customers);
            if let CustomerMatch::Ambiguous { chosen, candidates } = &matched {
                warn!(
                    uid = %draft.external_id,
                    %chosen,
                    ?candidates,
                    "ambiguous customer match"
                );
            }
            draft.customer_id = matched.customer_id().map(String::from);
        }

        debug!(phase = %SyncPhase::Reconciling, "sync phase");
        let mut reconciled = self
            .reconciler
            .reconcile_with(drafts, &connection.owner_id, customer_update)
            .await;
        reconciled.skipped_count = skipped;
        reconciled.errors.extend(directory_error);

        SyncReport::completed(&connection.id, reconciled)
    }
}

/// Marks a connection as syncing until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    connection_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, connection_id: &str) -> SyncResult<Self> {
        if !lock(set).insert(connection_id.to_string()) {
            return Err(SyncError::SyncInProgress(connection_id.to_string()));
        }
        Ok(InFlight {
            set,
            connection_id: connection_id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.connection_id);
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_both_field_spellings() {
        let camel: SyncRequest = serde_json::from_str(r#"{"connectionId": "c1"}"#).unwrap();
        let snake: SyncRequest = serde_json::from_str(r#"{"connection_id": "c1"}"#).unwrap();
        let missing: SyncRequest = serde_json::from_str("{}").unwrap();

        assert_eq!(camel.connection_id.as_deref(), Some("c1"));
        assert_eq!(snake.connection_id.as_deref(), Some("c1"));
        assert_eq!(missing.connection_id, None);
    }

    #[test]
    fn test_response_omits_empty_errors() {
        let report = SyncReport {
            connection_id: "c1".into(),
            imported_count: 1,
            updated_count: 0,
            skipped_count: 1,
            errors: vec![],
            fetch_failed: false,
        };

        let json = serde_json::to_value(SyncResponse::from(&report)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "imported_count": 1,
                "updated_count": 0,
                "skipped_count": 1
            })
        );
    }

    #[test]
    fn test_in_flight_marker_is_released_on_drop() {
        let set = Mutex::new(HashSet::new());
        {
            let _guard = InFlight::acquire(&set, "c1").unwrap();
            assert!(matches!(
                InFlight::acquire(&set, "c1"),
                Err(SyncError::SyncInProgress(_))
            ));
            assert!(InFlight::acquire(&set, "c2").is_ok());
        }
        assert!(InFlight::acquire(&set, "c1").is_ok());
    }
}
