//! Integration tests for poll cycles and the monitor loop.
//!
//! These tests run full cycles against a wiremock booking service with a
//! tempfile snapshot and a MockNotifier, so every side effect of a cycle
//! (request counts, snapshot bytes, notifications) can be asserted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Weekday};
use roadtest_monitor::{
    AppointmentFetcher, AuthClient, AuthError, ChangeReason, CycleError, CycleOutcome, DayPart,
    FetchError, FixedHeaders, Identity, MockNotifier, MonitorError, MonitorLoop, MonitorRequest,
    NotifyStatus, PollCycle, SnapshotStore, ValidationError,
    api::{ApiContext, LOGIN_PATH, SEARCH_PATH},
    config::NetworkConfig,
};
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn request() -> MonitorRequest {
    MonitorRequest {
        identity: Identity {
            last_name: "Doe".to_string(),
            licence_number: "1234567".to_string(),
            keyword: "secret".to_string(),
        },
        location_id: 273,
        exam_class: "5".to_string(),
        start_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        weekdays: vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
        day_parts: vec![DayPart::Morning, DayPart::Afternoon],
        interval: Duration::from_secs(3600),
        max_results: Some(10),
    }
}

fn records(slots: &[(&str, &str)]) -> Value {
    Value::Array(
        slots
            .iter()
            .map(|(date, time)| json!({ "appointmentDt": { "date": date }, "startTm": time }))
            .collect(),
    )
}

/// Replace every mock on the server: a working login and a search returning
/// `slots`.
async fn serve_slots(server: &MockServer, slots: &[(&str, &str)]) {
    server.reset().await;
    mount_login(server, ResponseTemplate::new(200).insert_header("Authorization", "Bearer t")).await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(slots)))
        .mount(server)
        .await;
}

async fn mount_login(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("PUT"))
        .and(path(LOGIN_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn request_count(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

/// A cycle wired to the mock server, a snapshot file and a mock notifier.
struct Harness {
    server: MockServer,
    notifier: MockNotifier,
    cycle: PollCycle,
    _dir: TempDir,
    snapshot_path: PathBuf,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempdir().unwrap();
        let snapshot_path = dir.path().join("appointments.txt");
        Self::with_snapshot_path(dir, snapshot_path, MockNotifier::new()).await
    }

    async fn with_snapshot_path(dir: TempDir, snapshot_path: PathBuf, notifier: MockNotifier) -> Self {
        let server = MockServer::start().await;
        let cycle = build_cycle(&server, &snapshot_path, notifier.clone());
        Self {
            server,
            notifier,
            cycle,
            _dir: dir,
            snapshot_path,
        }
    }

    fn snapshot_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.snapshot_path).unwrap()
    }
}

fn build_cycle(server: &MockServer, snapshot_path: &Path, notifier: MockNotifier) -> PollCycle {
    let network = NetworkConfig {
        request_timeout_secs: 10,
        connect_timeout_secs: 5,
    };
    let context = ApiContext::new(server.uri(), &network, Arc::new(FixedHeaders::default()))
        .expect("Context creation should succeed");

    PollCycle::new(
        AuthClient::new(context.clone()),
        AppointmentFetcher::new(context),
        SnapshotStore::new(snapshot_path),
        Arc::new(notifier),
    )
}

// ==================== Change Detection Tests ====================

/// The first non-empty result is persisted without notifying.
#[tokio::test]
async fn test_first_result_is_baseline_without_notification() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[("2024-06-10", "09:00"), ("2024-06-12", "13:30")]).await;

    let outcome = harness.cycle.run(&request()).await;

    match outcome {
        CycleOutcome::Changed {
            matching,
            reason,
            saved,
            notification,
        } => {
            assert_eq!(matching, 2);
            assert_eq!(reason, ChangeReason::Baseline);
            assert!(saved);
            assert_eq!(notification, NotifyStatus::NotRequired);
        }
        other => panic!("expected Changed, got {other:?}"),
    }
    assert!(!harness.notifier.was_called());
    assert_eq!(
        String::from_utf8(harness.snapshot_bytes()).unwrap(),
        "2024-06-10 Monday\t09:00\n2024-06-12 Wednesday\t13:30\n"
    );
}

/// Test that a strictly earlier date triggers exactly one notification.
#[tokio::test]
async fn test_earlier_date_notifies_with_rendered_slots() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[("2024-06-10", "09:00")]).await;
    harness.cycle.run(&request()).await;

    serve_slots(&harness.server, &[("2024-05-20", "10:00"), ("2024-06-10", "09:00")]).await;
    let outcome = harness.cycle.run(&request()).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Changed {
            reason: ChangeReason::EarlierDate { .. },
            saved: true,
            notification: NotifyStatus::Sent,
            ..
        }
    ));

    let notifications = harness.notifier.get_notifications();
    assert_eq!(notifications.len(), 1);
    let (subject, body) = &notifications[0];
    assert_eq!(subject, "ICBC Appointment Changes");
    assert_eq!(
        body,
        "Latest Appointments:\n2024-05-20 (Monday) at 10:00\n2024-06-10 (Monday) at 09:00\n"
    );
}

/// A later date is stored but never announced.
#[tokio::test]
async fn test_later_date_updates_silently() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[("2024-05-20", "10:00")]).await;
    harness.cycle.run(&request()).await;

    serve_slots(&harness.server, &[("2024-06-10", "09:00")]).await;
    let outcome = harness.cycle.run(&request()).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Changed {
            reason: ChangeReason::Updated,
            saved: true,
            notification: NotifyStatus::NotRequired,
            ..
        }
    ));
    assert!(!harness.notifier.was_called());
    assert_eq!(
        String::from_utf8(harness.snapshot_bytes()).unwrap(),
        "2024-06-10 Monday\t09:00\n"
    );
}

/// Same slots in a different order leave the snapshot file untouched.
#[tokio::test]
async fn test_reordered_slots_do_not_rewrite_snapshot() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[("2024-06-10", "09:00"), ("2024-06-12", "13:30")]).await;
    harness.cycle.run(&request()).await;
    let before = harness.snapshot_bytes();

    serve_slots(&harness.server, &[("2024-06-12", "13:30"), ("2024-06-10", "09:00")]).await;
    let outcome = harness.cycle.run(&request()).await;

    assert!(matches!(outcome, CycleOutcome::Unchanged { matching: 2 }));
    assert_eq!(harness.snapshot_bytes(), before);
    assert!(!harness.notifier.was_called());
}

/// Slots outside the window never reach the snapshot.
#[tokio::test]
async fn test_out_of_window_slots_are_filtered() {
    let harness = Harness::new().await;
    serve_slots(
        &harness.server,
        &[
            ("2024-04-30", "09:00"),
            ("2024-06-10", "07:30"),
            ("2024-06-10", "09:00"),
            ("2024-07-01", "09:00"),
        ],
    )
    .await;

    let outcome = harness.cycle.run(&request()).await;

    assert!(matches!(outcome, CycleOutcome::Changed { matching: 1, .. }));
    assert_eq!(
        String::from_utf8(harness.snapshot_bytes()).unwrap(),
        "2024-06-10 Monday\t09:00\n"
    );
}

#[tokio::test]
async fn test_matching_slots_are_capped() {
    let harness = Harness::new().await;
    serve_slots(
        &harness.server,
        &[
            ("2024-06-10", "09:00"),
            ("2024-06-11", "09:00"),
            ("2024-06-12", "09:00"),
        ],
    )
    .await;
    let mut request = request();
    request.max_results = Some(2);

    let outcome = harness.cycle.run(&request).await;

    assert!(matches!(outcome, CycleOutcome::Changed { matching: 2, .. }));
}

/// The cap keeps the earliest slots, so an earlier date arriving after
/// `max_results` later ones is still announced.
#[tokio::test]
async fn test_capped_result_still_announces_late_earlier_date() {
    let harness = Harness::new().await;
    std::fs::write(&harness.snapshot_path, "2024-06-01 Saturday\t10:00\n").unwrap();

    let late_days: Vec<String> = (10..20).map(|day| format!("2024-06-{day}")).collect();
    let mut slots: Vec<(&str, &str)> = late_days.iter().map(|d| (d.as_str(), "09:00")).collect();
    slots.push(("2024-05-20", "10:00"));
    serve_slots(&harness.server, &slots).await;

    let outcome = harness.cycle.run(&request()).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Changed {
            matching: 10,
            reason: ChangeReason::EarlierDate { .. },
            notification: NotifyStatus::Sent,
            ..
        }
    ));
    let saved = String::from_utf8(harness.snapshot_bytes()).unwrap();
    assert!(saved.contains("2024-05-20 Monday\t10:00"));
    assert!(!saved.contains("2024-06-19"));
    assert_eq!(saved.lines().count(), 10);
}

/// Provider times with seconds compare equal to the persisted `HH:MM` form.
#[tokio::test]
async fn test_times_with_seconds_do_not_rewrite_snapshot() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[("2024-06-10", "10:00:30")]).await;

    let first = harness.cycle.run(&request()).await;
    let before = harness.snapshot_bytes();
    let second = harness.cycle.run(&request()).await;

    assert!(matches!(first, CycleOutcome::Changed { saved: true, .. }));
    assert!(matches!(second, CycleOutcome::Unchanged { matching: 1 }));
    assert_eq!(before, b"2024-06-10 Monday\t10:00\n");
    assert_eq!(harness.snapshot_bytes(), before);
}

// ==================== Failure Isolation Tests ====================

/// A rejected login skips the cycle before any search or disk access.
#[tokio::test]
async fn test_auth_rejection_leaves_snapshot_untouched() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[("2024-06-10", "09:00")]).await;
    harness.cycle.run(&request()).await;
    let before = harness.snapshot_bytes();

    harness.server.reset().await;
    mount_login(&harness.server, ResponseTemplate::new(401)).await;
    let outcome = harness.cycle.run(&request()).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(CycleError::Auth(AuthError::Rejected(_)))
    ));
    assert_eq!(request_count(&harness.server, SEARCH_PATH).await, 0);
    assert_eq!(harness.snapshot_bytes(), before);
    assert!(!harness.notifier.was_called());
}

#[tokio::test]
async fn test_invalid_search_response_skips_cycle() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[("2024-06-10", "09:00")]).await;
    harness.cycle.run(&request()).await;
    let before = harness.snapshot_bytes();

    harness.server.reset().await;
    mount_login(
        &harness.server,
        ResponseTemplate::new(200).insert_header("Authorization", "Bearer t"),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"message": "expired"}"#))
        .mount(&harness.server)
        .await;

    let outcome = harness.cycle.run(&request()).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(CycleError::Fetch(FetchError::Invalid(_)))
    ));
    assert_eq!(harness.snapshot_bytes(), before);
}

/// A failed notification does not roll back the new snapshot.
#[tokio::test]
async fn test_notification_failure_still_saves() {
    let dir = tempdir().unwrap();
    let snapshot_path = dir.path().join("appointments.txt");
    let harness = Harness::with_snapshot_path(dir, snapshot_path, MockNotifier::failing()).await;
    serve_slots(&harness.server, &[("2024-06-10", "09:00")]).await;
    harness.cycle.run(&request()).await;

    serve_slots(&harness.server, &[("2024-05-20", "10:00")]).await;
    let outcome = harness.cycle.run(&request()).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Changed {
            saved: true,
            notification: NotifyStatus::Failed,
            ..
        }
    ));
    assert_eq!(harness.notifier.notification_count(), 1);
    assert_eq!(
        String::from_utf8(harness.snapshot_bytes()).unwrap(),
        "2024-05-20 Monday\t10:00\n"
    );

    // The next identical result is not announced again.
    let outcome = harness.cycle.run(&request()).await;
    assert!(matches!(outcome, CycleOutcome::Unchanged { .. }));
    assert_eq!(harness.notifier.notification_count(), 1);
}

/// A failed save is reported but does not abort the cycle; the change is
/// detected again next time.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_save_failure_does_not_abort_cycle() {
    let server = MockServer::start().await;
    let notifier = MockNotifier::new();
    // Reads report NotFound, directory creation is refused.
    let unwritable = Path::new("/proc/roadtest-monitor-missing/appointments.txt");
    let cycle = build_cycle(&server, unwritable, notifier.clone());
    serve_slots(&server, &[("2024-05-20", "10:00")]).await;

    for _ in 0..2 {
        let outcome = cycle.run(&request()).await;
        assert!(matches!(
            outcome,
            CycleOutcome::Changed {
                reason: ChangeReason::Baseline,
                saved: false,
                ..
            }
        ));
    }
    assert_eq!(request_count(&server, SEARCH_PATH).await, 2);
}

// ==================== Monitor Loop Tests ====================

#[tokio::test]
async fn test_start_rejects_invalid_request() {
    let harness = Harness::new().await;
    let mut monitor = MonitorLoop::new(harness.cycle);
    let mut request = request();
    request.weekdays.clear();

    let result = monitor.start(request);

    assert!(matches!(
        result,
        Err(MonitorError::Validation(ValidationError::NoWeekdays))
    ));
    assert!(!monitor.is_running());
    assert!(harness.server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_loop_runs_first_cycle_immediately() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[("2024-06-10", "09:00")]).await;
    let snapshot_path = harness.snapshot_path.clone();
    let mut monitor = MonitorLoop::new(harness.cycle);
    let mut completed = monitor.completed_cycles();

    monitor.start(request()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), completed.wait_for(|n| *n >= 1))
        .await
        .expect("first cycle should not wait for the interval")
        .unwrap();
    monitor.stop().await.unwrap();

    assert_eq!(
        std::fs::read_to_string(&snapshot_path).unwrap(),
        "2024-06-10 Monday\t09:00\n"
    );
    assert_eq!(*completed.borrow(), 1);
}

/// Slow cycles are never overlapped: each cycle logs in exactly once and the
/// next one only starts after the previous has finished.
#[tokio::test]
async fn test_slow_cycles_do_not_overlap() {
    let harness = Harness::new().await;
    mount_login(
        &harness.server,
        ResponseTemplate::new(200)
            .insert_header("Authorization", "Bearer t")
            .set_delay(Duration::from_millis(200)),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&harness.server)
        .await;

    let mut monitor = MonitorLoop::new(harness.cycle);
    let completed = monitor.completed_cycles();
    let mut request = request();
    request.interval = Duration::from_millis(20);

    monitor.start(request).unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    monitor.stop().await.unwrap();

    let cycles = *completed.borrow();
    let logins = request_count(&harness.server, LOGIN_PATH).await;
    assert!(cycles >= 1);
    assert_eq!(logins as u64, cycles);
    // 200ms per cycle over ~700ms: skipped ticks are not queued up.
    assert!(cycles <= 5, "expected at most 5 cycles, got {cycles}");
}

/// Stopping waits for the cycle in progress; nothing runs afterwards.
#[tokio::test]
async fn test_stop_lets_in_flight_cycle_finish() {
    let harness = Harness::new().await;
    mount_login(
        &harness.server,
        ResponseTemplate::new(200)
            .insert_header("Authorization", "Bearer t")
            .set_delay(Duration::from_millis(300)),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(&[("2024-06-10", "09:00")])))
        .mount(&harness.server)
        .await;
    let snapshot_path = harness.snapshot_path.clone();

    let mut monitor = MonitorLoop::new(harness.cycle);
    let completed = monitor.completed_cycles();
    monitor.start(request()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !monitor.is_cycle_in_flight() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("cycle should start");

    monitor.stop().await.unwrap();

    assert!(!monitor.is_running());
    assert!(!monitor.is_cycle_in_flight());
    assert_eq!(*completed.borrow(), 1);
    assert!(snapshot_path.exists());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(request_count(&harness.server, LOGIN_PATH).await, 1);
}

#[tokio::test]
async fn test_double_start_and_stop() {
    let harness = Harness::new().await;
    serve_slots(&harness.server, &[]).await;
    let mut monitor = MonitorLoop::new(harness.cycle);

    monitor.start(request()).unwrap();
    assert!(matches!(
        monitor.start(request()),
        Err(MonitorError::AlreadyRunning)
    ));

    monitor.stop().await.unwrap();
    assert!(matches!(monitor.stop().await, Err(MonitorError::NotRunning)));
}
