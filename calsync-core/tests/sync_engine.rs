//! End-to-end runs of the sync engine against in-memory stores and scripted
//! feed strategies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio::sync::Notify;

use calsync_core::appointment::{AppointmentChanges, NewAppointment};
use calsync_core::error::StrategyError;
use calsync_core::fetch::{FeedStrategy, FetchContext, FetchedFeed};
use calsync_core::status::Clock;
use calsync_core::store::{
    AppointmentStore, ConnectionStore, CustomerDirectory, MemoryAppointmentStore,
    MemoryConnectionStore, MemoryCustomerDirectory,
};
use calsync_core::{
    Appointment, AppointmentStatus, CalendarConnection, Collaborators, Customer, Fetcher,
    StoreError, SyncConfig, SyncEngine, SyncError, SyncRecord, SyncRequest, SyncResponse,
    SyncStatus,
};

const SCENARIO_FEED: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//Example//Calendar//EN\r
BEGIN:VEVENT\r
UID:evt-1\r
DTSTAMP:20250201T000000Z\r
DTSTART:20250301T100000Z\r
DTEND:20250301T110000Z\r
SUMMARY:Jane Doe\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:evt-2\r
DTSTAMP:20250201T000000Z\r
SUMMARY:Untitled\r
END:VEVENT\r
END:VCALENDAR\r
";

/// Serves whatever feed text it currently holds.
struct StaticFeed {
    body: Arc<Mutex<String>>,
}

#[async_trait]
impl FeedStrategy for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, _url: &str, _ctx: &FetchContext) -> Result<FetchedFeed, StrategyError> {
        let body = self.body.lock().unwrap().clone();
        Ok(FetchedFeed::Raw(body))
    }
}

struct Unreachable;

#[async_trait]
impl FeedStrategy for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn fetch(&self, _url: &str, _ctx: &FetchContext) -> Result<FetchedFeed, StrategyError> {
        Err(StrategyError::Status(503))
    }
}

/// Blocks until released, then serves the feed.
struct Gated {
    gate: Arc<Notify>,
    body: String,
}

#[async_trait]
impl FeedStrategy for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch(&self, _url: &str, _ctx: &FetchContext) -> Result<FetchedFeed, StrategyError> {
        self.gate.notified().await;
        Ok(FetchedFeed::Raw(self.body.clone()))
    }
}

/// Memory store that refuses to insert one uid.
struct FlakyAppointments {
    inner: MemoryAppointmentStore,
    reject_uid: &'static str,
}

#[async_trait]
impl AppointmentStore for FlakyAppointments {
    async fn find_by_external_id(
        &self,
        external_id: &str,
        connection_id: &str,
    ) -> Result<Option<Appointment>, StoreError> {
        self.inner.find_by_external_id(external_id, connection_id).await
    }

    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        if appointment.draft.external_id == self.reject_uid {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.insert(appointment).await
    }

    async fn update(&self, id: &str, changes: AppointmentChanges) -> Result<Appointment, StoreError> {
        self.inner.update(id, changes).await
    }

    async fn list_for_connection(&self, connection_id: &str) -> Result<Vec<Appointment>, StoreError> {
        self.inner.list_for_connection(connection_id).await
    }
}

/// Connection store whose status writes always fail.
struct ReadOnlyConnections(MemoryConnectionStore);

#[async_trait]
impl ConnectionStore for ReadOnlyConnections {
    async fn get(&self, id: &str) -> Result<Option<CalendarConnection>, StoreError> {
        self.0.get(id).await
    }

    async fn record_sync(&self, _id: &str, _record: &SyncRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read-only replica".into()))
    }
}

/// Customer directory that can be switched off.
struct SwitchableDirectory {
    inner: MemoryCustomerDirectory,
    down: AtomicBool,
}

#[async_trait]
impl CustomerDirectory for SwitchableDirectory {
    async fn customers_for_owner(&self, owner_id: &str) -> Result<Vec<Customer>, StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("directory offline".into()));
        }
        self.inner.customers_for_owner(owner_id).await
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct Harness {
    engine: Arc<SyncEngine>,
    appointments: Arc<MemoryAppointmentStore>,
    connections: Arc<MemoryConnectionStore>,
}

fn connection(id: &str) -> CalendarConnection {
    CalendarConnection::new(id, "provider-1", Some("webcal://calendar.example.com/feed.ics".into()))
}

fn customers() -> Vec<Customer> {
    vec![Customer {
        id: "cust-jane".into(),
        owner_id: "provider-1".into(),
        name: "Jane Doe".into(),
    }]
}

fn fetcher(strategy: impl FeedStrategy + 'static) -> Fetcher {
    Fetcher::new(vec![Box::new(strategy)], Duration::from_secs(5))
}

fn harness(connections: Vec<CalendarConnection>, fetcher: Fetcher) -> Harness {
    let appointments = Arc::new(MemoryAppointmentStore::new());
    let connections = Arc::new(MemoryConnectionStore::new(connections));
    let engine = SyncEngine::new(
        Collaborators {
            connections: connections.clone(),
            customers: Arc::new(MemoryCustomerDirectory::new(customers())),
            appointments: appointments.clone(),
        },
        fetcher,
        &SyncConfig::default(),
    )
    .unwrap();

    Harness {
        engine: Arc::new(engine),
        appointments,
        connections,
    }
}

fn static_feed(body: &str) -> (StaticFeed, Arc<Mutex<String>>) {
    let body = Arc::new(Mutex::new(body.to_string()));
    (StaticFeed { body: body.clone() }, body)
}

#[tokio::test]
async fn test_scenario_first_run_imports_and_skips() {
    let (feed, _) = static_feed(SCENARIO_FEED);
    let h = harness(vec![connection("conn-1")], fetcher(feed));

    let report = h
        .engine
        .sync_now(&SyncRequest::for_connection("conn-1"))
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(report.imported_count, 1);
    assert_eq!(report.updated_count, 0);
    assert_eq!(report.skipped_count, 1);

    let rows = h.appointments.all().await;
    assert_eq!(rows.len(), 1);
    let jane = &rows[0];
    assert_eq!(jane.external_id.as_deref(), Some("evt-1"));
    assert_eq!(jane.connection_id.as_deref(), Some("conn-1"));
    assert_eq!(jane.booking_date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    assert_eq!(jane.booking_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(jane.duration_minutes, 60);
    assert_eq!(jane.notes, "Jane Doe");
    assert_eq!(jane.customer_id.as_deref(), Some("cust-jane"));
    assert_eq!(jane.status, AppointmentStatus::Confirmed);
    assert_eq!(jane.source, "calendar_sync");
    assert_eq!(jane.provider_id, "provider-1");

    let json = serde_json::to_value(jane).unwrap();
    assert_eq!(json["booking_date"], "2025-03-01");
    assert_eq!(json["booking_time"], "10:00");
}

#[tokio::test]
async fn test_scenario_rerun_is_idempotent() {
    let (feed, _) = static_feed(SCENARIO_FEED);
    let h = harness(vec![connection("conn-1")], fetcher(feed));
    let request = SyncRequest::for_connection("conn-1");

    h.engine.sync_now(&request).await.unwrap();
    let second = h.engine.sync_now(&request).await.unwrap();

    assert_eq!(second.imported_count, 0);
    assert_eq!(second.updated_count, 1);
    assert_eq!(second.skipped_count, 1);
    assert_eq!(h.appointments.all().await.len(), 1);
}

#[tokio::test]
async fn test_rerun_applies_changed_times() {
    let (feed, body) = static_feed(SCENARIO_FEED);
    let h = harness(vec![connection("conn-1")], fetcher(feed));
    let request = SyncRequest::for_connection("conn-1");

    h.engine.sync_now(&request).await.unwrap();
    *body.lock().unwrap() = SCENARIO_FEED
        .replace("DTSTART:20250301T100000Z", "DTSTART:20250301T133000Z")
        .replace("DTEND:20250301T110000Z", "DTEND:20250301T150000Z");
    let report = h.engine.sync_now(&request).await.unwrap();

    assert_eq!(report.updated_count, 1);
    let rows = h.appointments.all().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].booking_time, NaiveTime::from_hms_opt(13, 30, 0).unwrap());
    assert_eq!(rows[0].duration_minutes, 90);
}

#[tokio::test]
async fn test_total_fetch_failure_records_error_status() {
    let at = Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap();
    let appointments = Arc::new(MemoryAppointmentStore::new());
    let connections = Arc::new(MemoryConnectionStore::new(vec![connection("conn-1")]));
    let engine = SyncEngine::new(
        Collaborators {
            connections: connections.clone(),
            customers: Arc::new(MemoryCustomerDirectory::default()),
            appointments: appointments.clone(),
        },
        fetcher(Unreachable),
        &SyncConfig::default(),
    )
    .unwrap()
    .with_clock(Arc::new(FixedClock(at)));

    let report = engine
        .sync_now(&SyncRequest::for_connection("conn-1"))
        .await
        .unwrap();

    assert!(report.fetch_failed);
    assert!(!report.success());
    assert_eq!(report.imported_count + report.updated_count + report.skipped_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Failed to fetch calendar feed"));
    assert!(appointments.all().await.is_empty());

    let conn = connections.get("conn-1").await.unwrap().unwrap();
    assert_eq!(conn.last_sync_status, Some(SyncStatus::Error));
    assert_eq!(conn.last_synced_at, Some(at));
    assert!(
        conn.last_sync_error
            .as_deref()
            .is_some_and(|e| e.contains("unreachable: server responded with status 503"))
    );
}

#[tokio::test]
async fn test_one_failed_write_does_not_stop_the_rest() {
    let feed_text = SCENARIO_FEED.replace(
        "BEGIN:VEVENT\r\nUID:evt-2",
        "BEGIN:VEVENT\r\nUID:evt-3\r\nDTSTART:20250302T090000Z\r\nSUMMARY:Bob\r\nEND:VEVENT\r\n\
         BEGIN:VEVENT\r\nUID:evt-4\r\nDTSTART:20250303T090000Z\r\nSUMMARY:Carol\r\nEND:VEVENT\r\n\
         BEGIN:VEVENT\r\nUID:evt-2",
    );
    let (feed, _) = static_feed(&feed_text);
    let appointments = Arc::new(FlakyAppointments {
        inner: MemoryAppointmentStore::new(),
        reject_uid: "evt-3",
    });
    let connections = Arc::new(MemoryConnectionStore::new(vec![connection("conn-1")]));
    let engine = SyncEngine::new(
        Collaborators {
            connections: connections.clone(),
            customers: Arc::new(MemoryCustomerDirectory::new(customers())),
            appointments: appointments.clone(),
        },
        fetcher(feed),
        &SyncConfig::default(),
    )
    .unwrap();

    let report = engine
        .sync_now(&SyncRequest::for_connection("conn-1"))
        .await
        .unwrap();

    assert_eq!(report.imported_count, 2);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(report.errors, vec!["evt-3: store unavailable: connection reset".to_string()]);
    assert_eq!(appointments.inner.all().await.len(), 2);

    let response = SyncResponse::from(&report);
    assert!(!response.success);
    assert_eq!(response.errors.map(|e| e.len()), Some(1));

    let conn = connections.get("conn-1").await.unwrap().unwrap();
    assert_eq!(conn.last_sync_status, Some(SyncStatus::Error));
    assert_eq!(conn.imported_count, 2);
}

#[tokio::test]
async fn test_imported_count_accumulates_across_runs() {
    let (feed, body) = static_feed(SCENARIO_FEED);
    let h = harness(vec![connection("conn-1")], fetcher(feed));
    let request = SyncRequest::for_connection("conn-1");

    h.engine.sync_now(&request).await.unwrap();
    *body.lock().unwrap() = SCENARIO_FEED.replace("UID:evt-1", "UID:evt-9");
    h.engine.sync_now(&request).await.unwrap();
    // Nothing new on the third run
    h.engine.sync_now(&request).await.unwrap();

    let conn = h.connections.get("conn-1").await.unwrap().unwrap();
    assert_eq!(conn.imported_count, 2);
    assert_eq!(conn.last_sync_status, Some(SyncStatus::Success));
    assert_eq!(conn.last_sync_error, None);
}

#[tokio::test]
async fn test_connection_timezone_sets_local_booking_time() {
    let (feed, _) = static_feed(SCENARIO_FEED);
    let mut conn = connection("conn-ny");
    conn.timezone = Some("America/New_York".into());
    let h = harness(vec![conn], fetcher(feed));

    h.engine
        .sync_now(&SyncRequest::for_connection("conn-ny"))
        .await
        .unwrap();

    let rows = h.appointments.all().await;
    assert_eq!(rows[0].booking_date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    assert_eq!(rows[0].booking_time, NaiveTime::from_hms_opt(5, 0, 0).unwrap());
}

#[tokio::test]
async fn test_request_level_errors() {
    let (feed, _) = static_feed(SCENARIO_FEED);
    let no_feed = CalendarConnection::new("conn-empty", "provider-1", Some("   ".into()));
    let h = harness(vec![no_feed], fetcher(feed));

    let missing = h.engine.sync_now(&SyncRequest::default()).await;
    assert!(matches!(missing, Err(SyncError::MissingConnectionId)));

    let blank = h.engine.sync_now(&SyncRequest::for_connection("  ")).await;
    assert!(matches!(blank, Err(SyncError::MissingConnectionId)));

    let unknown = h.engine.sync_now(&SyncRequest::for_connection("nope")).await;
    assert!(matches!(unknown, Err(SyncError::ConnectionNotFound(id)) if id == "nope"));

    let no_address = h.engine.sync_now(&SyncRequest::for_connection("conn-empty")).await;
    assert!(matches!(no_address, Err(SyncError::MissingFeedAddress(_))));

    let conn = h.connections.get("conn-empty").await.unwrap().unwrap();
    assert_eq!(conn.last_synced_at, None);
}

#[tokio::test]
async fn test_inactive_connection_still_syncs_on_request() {
    let (feed, _) = static_feed(SCENARIO_FEED);
    let mut conn = connection("conn-1");
    conn.active = false;
    let h = harness(vec![conn], fetcher(feed));

    let report = h
        .engine
        .sync_now(&SyncRequest::for_connection("conn-1"))
        .await
        .unwrap();

    assert_eq!(report.imported_count, 1);
    let conn = h.connections.get("conn-1").await.unwrap().unwrap();
    assert!(!conn.active);
}

#[tokio::test]
async fn test_concurrent_run_for_same_connection_is_rejected() {
    let gate = Arc::new(Notify::new());
    let strategy = Gated {
        gate: gate.clone(),
        body: SCENARIO_FEED.to_string(),
    };
    let h = harness(vec![connection("conn-1")], fetcher(strategy));

    let engine = h.engine.clone();
    let first = tokio::spawn(async move {
        engine
            .sync_now(&SyncRequest::for_connection("conn-1"))
            .await
    });

    while !h.engine.is_syncing("conn-1") {
        tokio::task::yield_now().await;
    }

    let second = h
        .engine
        .sync_now(&SyncRequest::for_connection("conn-1"))
        .await;
    assert!(matches!(second, Err(SyncError::SyncInProgress(_))));

    gate.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.imported_count, 1);
    assert!(!h.engine.is_syncing("conn-1"));
}

#[tokio::test]
async fn test_run_deadline_bounds_the_fetch() {
    let strategy = Gated {
        gate: Arc::new(Notify::new()),
        body: String::new(),
    };
    let connections = Arc::new(MemoryConnectionStore::new(vec![connection("conn-1")]));
    let config = SyncConfig {
        run_deadline: Some(Duration::from_millis(50)),
        ..SyncConfig::default()
    };
    let engine = SyncEngine::new(
        Collaborators {
            connections: connections.clone(),
            customers: Arc::new(MemoryCustomerDirectory::default()),
            appointments: Arc::new(MemoryAppointmentStore::new()),
        },
        fetcher(strategy),
        &config,
    )
    .unwrap();

    let report = engine
        .sync_now(&SyncRequest::for_connection("conn-1"))
        .await
        .unwrap();

    assert!(report.fetch_failed);
    assert!(report.errors[0].contains("run deadline of 50ms exceeded"));
    assert!(!engine.is_syncing("conn-1"));
}

#[tokio::test]
async fn test_status_write_failure_is_reported() {
    let (feed, _) = static_feed(SCENARIO_FEED);
    let engine = SyncEngine::new(
        Collaborators {
            connections: Arc::new(ReadOnlyConnections(MemoryConnectionStore::new(vec![
                connection("conn-1"),
            ]))),
            customers: Arc::new(MemoryCustomerDirectory::default()),
            appointments: Arc::new(MemoryAppointmentStore::new()),
        },
        fetcher(feed),
        &SyncConfig::default(),
    )
    .unwrap();

    let report = engine
        .sync_now(&SyncRequest::for_connection("conn-1"))
        .await
        .unwrap();

    assert_eq!(report.imported_count, 1);
    assert!(!report.success());
    assert_eq!(
        report.errors,
        vec!["Failed to record sync status: store unavailable: read-only replica".to_string()]
    );
}

#[tokio::test]
async fn test_directory_outage_keeps_matches_and_reports_error() {
    let (feed, _) = static_feed(SCENARIO_FEED);
    let appointments = Arc::new(MemoryAppointmentStore::new());
    let connections = Arc::new(MemoryConnectionStore::new(vec![connection("conn-1")]));
    let directory = Arc::new(SwitchableDirectory {
        inner: MemoryCustomerDirectory::new(customers()),
        down: AtomicBool::new(false),
    });
    let engine = SyncEngine::new(
        Collaborators {
            connections: connections.clone(),
            customers: directory.clone(),
            appointments: appointments.clone(),
        },
        fetcher(feed),
        &SyncConfig::default(),
    )
    .unwrap();
    let request = SyncRequest::for_connection("conn-1");

    engine.sync_now(&request).await.unwrap();
    assert_eq!(appointments.all().await[0].customer_id.as_deref(), Some("cust-jane"));

    directory.down.store(true, Ordering::SeqCst);
    let report = engine.sync_now(&request).await.unwrap();

    assert_eq!(report.updated_count, 1);
    assert!(!report.success());
    assert_eq!(
        report.errors,
        vec!["Customer directory unavailable: store unavailable: directory offline".to_string()]
    );
    assert_eq!(appointments.all().await[0].customer_id.as_deref(), Some("cust-jane"));

    let conn = connections.get("conn-1").await.unwrap().unwrap();
    assert_eq!(conn.last_sync_status, Some(SyncStatus::Error));
}
