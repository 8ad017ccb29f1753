//! Exactly-once semantics of the status monitor.

use acore::{AxonError, JobHandle, JobId, JobKind};
use chrono::Utc;
use queue::{JobStore, MonitorCallbacks, monitor};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn handle() -> JobHandle {
    JobHandle {
        id: JobId::new(),
        kind: JobKind::SingleCell,
        submitted_at: Utc::now(),
    }
}

/// Callbacks that record every firing into a shared log.
fn recording(log: Arc<Mutex<Vec<String>>>) -> MonitorCallbacks {
    let (start, success, failure, position) =
        (log.clone(), log.clone(), log.clone(), log);
    MonitorCallbacks {
        on_start: Box::new(move || start.lock().unwrap().push("start".into())),
        on_success: Box::new(move || success.lock().unwrap().push("success".into())),
        on_failure: Box::new(move |detail| {
            failure.lock().unwrap().push(format!("failure:{detail}"))
        }),
        on_position: Box::new(move |p| position.lock().unwrap().push(format!("position:{p}"))),
    }
}

#[tokio::test]
async fn full_transition_fires_each_callback_once() {
    let store = Arc::new(JobStore::in_memory().unwrap());
    let h = handle();
    store.insert(&h, &json!({})).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let driver_store = store.clone();
    let driver_id = h.id.clone();
    let driver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        driver_store.mark_running(&driver_id).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        driver_store.mark_finished(&driver_id, true, None).unwrap();
    });

    monitor(
        store,
        &h,
        recording(log.clone()),
        Duration::from_millis(5),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    driver.await.unwrap();

    // Running was polled several times; "start" still fired once.
    assert_eq!(*log.lock().unwrap(), ["position:0", "start", "success"]);
}

#[tokio::test]
async fn skipped_start_is_replayed_before_failure() {
    let store = Arc::new(JobStore::in_memory().unwrap());
    let h = handle();
    store.insert(&h, &json!({})).unwrap();
    // The job races to a terminal state before the first poll.
    store.mark_running(&h.id).unwrap();
    store.mark_finished(&h.id, false, Some("boom")).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    monitor(
        store,
        &h,
        recording(log.clone()),
        Duration::from_millis(5),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert_eq!(*log.lock().unwrap(), ["start", "failure:boom"]);
}

#[tokio::test]
async fn deadline_fires_failure_once_and_errors() {
    let store = Arc::new(JobStore::in_memory().unwrap());
    let h = handle();
    store.insert(&h, &json!({})).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let err = monitor(
        store,
        &h,
        recording(log.clone()),
        Duration::from_millis(5),
        Duration::from_millis(40),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AxonError::Timeout { .. }));
    let log = log.lock().unwrap();
    // The head-of-queue position update, then exactly one failure.
    assert_eq!(log[0], "position:0");
    assert_eq!(log.len(), 2);
    assert!(log[1].starts_with("failure:"));
}

#[tokio::test]
async fn position_updates_only_on_change() {
    let store = Arc::new(JobStore::in_memory().unwrap());
    let ahead = handle();
    let watched = handle();
    store.insert(&ahead, &json!({})).unwrap();
    store.insert(&watched, &json!({})).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let driver_store = store.clone();
    let ahead_id = ahead.id.clone();
    let watched_id = watched.id.clone();
    let driver = tokio::spawn(async move {
        // Let several polls observe position 1 first.
        tokio::time::sleep(Duration::from_millis(40)).await;
        driver_store.mark_running(&ahead_id).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        driver_store.mark_running(&watched_id).unwrap();
        driver_store.mark_finished(&watched_id, true, None).unwrap();
    });

    monitor(
        store,
        &watched,
        recording(log.clone()),
        Duration::from_millis(5),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    driver.await.unwrap();

    assert_eq!(*log.lock().unwrap(), ["position:1", "position:0", "start", "success"]);
}
