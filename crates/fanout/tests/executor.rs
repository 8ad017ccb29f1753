//! End-to-end executor tests using small shell scripts as workers.
//!
//! The pool appends the task id as the script's `$0`, and each script
//! reads its task line from stdin first, mirroring the real child
//! protocol.

use acore::{AxonError, StopSignal};
use fanout::{ChildCommand, FanoutEvent, FanoutSpec, run};
use serde_json::{Value, json};
use std::time::Duration;

fn sh(script: &str) -> ChildCommand {
    ChildCommand {
        program: "sh".into(),
        args: vec!["-c".into(), script.to_string()],
    }
}

fn spec(command: ChildCommand, sets: Vec<Value>) -> FanoutSpec {
    FanoutSpec {
        command,
        parameter_sets: sets,
        pool_cap: 0,
        stop: StopSignal::new(),
        grace: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
    }
}

/// Emits one payload and its sentinel, then exits.
const WELL_BEHAVED: &str = r#"
read task
printf '{"type":"payload","task_id":%s,"payload":{"set":%s}}\n' "$0" "$0"
printf '{"type":"done","task_id":%s}\n' "$0"
"#;

#[tokio::test]
async fn completion_one_payload_per_set() {
    let sets: Vec<Value> = (0..4).map(|i| json!({ "amplitude": i })).collect();
    let mut payloads = Vec::new();
    let summary = run(spec(sh(WELL_BEHAVED), sets), |event| {
        if let FanoutEvent::Payload { task_id, .. } = event {
            payloads.push(task_id);
        }
    })
    .await
    .unwrap();

    assert_eq!(summary.expected, 4);
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.payloads, 4);
    assert!(!summary.failed);
    assert!(!summary.cancelled);

    // One payload per parameter set, arrival order unspecified.
    payloads.sort_unstable();
    assert_eq!(payloads, [0, 1, 2, 3]);
}

#[tokio::test]
async fn pool_never_exceeds_task_count() {
    let summary = run(spec(sh(WELL_BEHAVED), vec![json!({})]), |_| {})
        .await
        .unwrap();
    assert_eq!(summary.completed, 1);
}

#[tokio::test]
async fn empty_parameter_sets_is_a_noop() {
    let summary = run(spec(sh(WELL_BEHAVED), Vec::new()), |_| {
        panic!("no events expected")
    })
    .await
    .unwrap();
    assert_eq!(summary.expected, 0);
    assert_eq!(summary.completed, 0);
}

/// Task 1 fails with a structured error; the others produce data.
/// Every worker still emits its sentinel, so the run finishes without
/// hanging and reports overall failure.
const ONE_BAD_APPLE: &str = r#"
read task
if [ "$0" = "1" ]; then
  printf '{"type":"error","task_id":1,"kind":"numeric","message":"integration diverged"}\n'
else
  printf '{"type":"payload","task_id":%s,"payload":{"set":%s}}\n' "$0" "$0"
fi
printf '{"type":"done","task_id":%s}\n' "$0"
"#;

#[tokio::test]
async fn one_failing_set_fails_the_run_without_hanging() {
    let sets: Vec<Value> = (0..3).map(|i| json!({ "frequency": i })).collect();
    let mut payloads = 0;
    let mut errors = Vec::new();
    let summary = run(spec(sh(ONE_BAD_APPLE), sets), |event| match event {
        FanoutEvent::Payload { .. } => payloads += 1,
        FanoutEvent::Error { kind, message, .. } => errors.push((kind, message)),
    })
    .await
    .unwrap();

    assert_eq!(payloads, 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "numeric");
    assert!(summary.failed);
    assert_eq!(summary.completed, 3);
}

/// Blocks until the parent's `stop` control line, then finishes
/// cleanly without producing data.
const COOPERATIVE: &str = r#"
read task
read control
printf '{"type":"done","task_id":%s}\n' "$0"
"#;

#[tokio::test]
async fn stop_signal_ends_the_run_early() {
    let sets: Vec<Value> = (0..3).map(|i| json!({ "set": i })).collect();
    let stop = StopSignal::new();
    let mut fanout_spec = spec(sh(COOPERATIVE), sets);
    fanout_spec.stop = stop.clone();

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        stop.set();
    });

    let summary = run(fanout_spec, |_| {}).await.unwrap();
    assert!(summary.cancelled);
    assert!(summary.completed < summary.expected);
    trigger.await.unwrap();
}

/// Ignores the stop line entirely; teardown must escalate to a kill
/// and still join every child.
const STUBBORN: &str = r#"
read task
exec sleep 60
"#;

#[tokio::test]
async fn stubborn_children_get_killed_after_grace() {
    let sets: Vec<Value> = (0..2).map(|i| json!({ "set": i })).collect();
    let stop = StopSignal::new();
    let mut fanout_spec = spec(sh(STUBBORN), sets);
    fanout_spec.stop = stop.clone();
    fanout_spec.grace = Duration::from_millis(100);

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.set();
    });

    let started = std::time::Instant::now();
    let summary = run(fanout_spec, |_| {}).await.unwrap();
    assert!(summary.cancelled);
    // Far less than the 60s the children wanted to sleep.
    assert!(started.elapsed() < Duration::from_secs(10));
    trigger.await.unwrap();
}

/// Dies without ever emitting a sentinel.
const SILENT_DEATH: &str = r#"
read task
exit 3
"#;

#[tokio::test]
async fn silent_child_death_is_an_error_not_a_hang() {
    let sets: Vec<Value> = (0..2).map(|i| json!({ "set": i })).collect();
    let err = run(spec(sh(SILENT_DEATH), sets), |_| {})
        .await
        .unwrap_err();
    match err {
        AxonError::ChildrenDied {
            expected,
            completed,
        } => {
            assert_eq!(expected, 2);
            assert_eq!(completed, 0);
        }
        other => panic!("expected ChildrenDied, got {other}"),
    }
}
