//! Job table bookkeeping tests.

use acore::{JobHandle, JobId, JobKind, JobState};
use chrono::Utc;
use queue::JobStore;
use serde_json::json;

fn handle(kind: JobKind) -> JobHandle {
    JobHandle {
        id: JobId::new(),
        kind,
        submitted_at: Utc::now(),
    }
}

#[test]
fn insert_then_get() {
    let store = JobStore::in_memory().unwrap();
    let h = handle(JobKind::SingleCell);
    store.insert(&h, &json!({"amplitudes": [0.1, 0.2]})).unwrap();

    let record = store.get(&h.id).unwrap().unwrap();
    assert_eq!(record.id, h.id);
    assert_eq!(record.kind, JobKind::SingleCell);
    assert_eq!(record.status, JobState::Queued);
    assert_eq!(record.queue_position, Some(0));
    assert!(record.error.is_none());
    assert!(record.started_at.is_none());
    assert!(record.ended_at.is_none());
}

#[test]
fn unknown_id_is_none() {
    let store = JobStore::in_memory().unwrap();
    assert!(store.get(&JobId::new()).unwrap().is_none());
}

#[test]
fn queue_positions_follow_insert_order() {
    let store = JobStore::in_memory().unwrap();
    let handles: Vec<_> = (0..3).map(|_| handle(JobKind::Circuit)).collect();
    for h in &handles {
        store.insert(h, &json!({})).unwrap();
    }
    for (i, h) in handles.iter().enumerate() {
        assert_eq!(store.queue_position(&h.id).unwrap(), Some(i as u32));
    }

    // The head leaves the queue; everyone behind moves up.
    store.mark_running(&handles[0].id).unwrap();
    assert_eq!(store.queue_position(&handles[0].id).unwrap(), None);
    assert_eq!(store.queue_position(&handles[1].id).unwrap(), Some(0));
    assert_eq!(store.queue_position(&handles[2].id).unwrap(), Some(1));
}

#[test]
fn lifecycle_is_monotonic() {
    let store = JobStore::in_memory().unwrap();
    let h = handle(JobKind::MeshAnalysis);
    store.insert(&h, &json!({})).unwrap();

    assert!(store.mark_running(&h.id).unwrap());
    // A second running transition has nothing queued to move.
    assert!(!store.mark_running(&h.id).unwrap());

    assert!(store.mark_finished(&h.id, true, None).unwrap());
    // Terminal states never change again.
    assert!(!store.mark_finished(&h.id, false, Some("late")).unwrap());

    let record = store.get(&h.id).unwrap().unwrap();
    assert_eq!(record.status, JobState::Succeeded);
    assert!(record.error.is_none());
    assert!(record.started_at.is_some());
    assert!(record.ended_at.is_some());
}

#[test]
fn failure_records_error_detail() {
    let store = JobStore::in_memory().unwrap();
    let h = handle(JobKind::SynapsePlacement);
    store.insert(&h, &json!({})).unwrap();
    store.mark_running(&h.id).unwrap();
    store
        .mark_finished(&h.id, false, Some("integration diverged"))
        .unwrap();

    let record = store.get(&h.id).unwrap().unwrap();
    assert_eq!(record.status, JobState::Failed);
    assert_eq!(record.error.as_deref(), Some("integration diverged"));
}

#[test]
fn pending_lists_only_queued_in_order() {
    let store = JobStore::in_memory().unwrap();
    let first = handle(JobKind::SingleCell);
    let second = handle(JobKind::Circuit);
    let third = handle(JobKind::MeshAnalysis);
    for h in [&first, &second, &third] {
        store.insert(h, &json!({"n": 1})).unwrap();
    }
    store.mark_running(&second.id).unwrap();

    let pending = store.pending().unwrap();
    let ids: Vec<_> = pending.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, [first.id.clone(), third.id.clone()]);
    assert_eq!(pending[0].kind, JobKind::SingleCell);
    assert_eq!(pending[0].args, json!({"n": 1}));
}

#[test]
fn survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");
    let h = handle(JobKind::Circuit);
    {
        let store = JobStore::open(&path).unwrap();
        store.insert(&h, &json!({"frequencies": [5.0]})).unwrap();
    }
    let store = JobStore::open(&path).unwrap();
    let record = store.get(&h.id).unwrap().unwrap();
    assert_eq!(record.status, JobState::Queued);
    assert_eq!(store.pending().unwrap().len(), 1);
}
