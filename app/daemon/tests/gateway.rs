//! Gateway integration tests over a live socket, driven with raw
//! HTTP/1.1 so no client stack is pulled in. The exercised kinds run
//! in-process; the fan-out kinds need the real binary as the child
//! program and are covered by the executor's own tests.

use axond::{DaemonConfig, serve_with_config};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start() -> (axond::ServeHandle, u16, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = DaemonConfig {
        bind: "127.0.0.1:0".to_owned(),
        ..DaemonConfig::default()
    };
    let handle = serve_with_config(&config, dir.path()).await.unwrap();
    let port = handle.port;
    (handle, port, dir)
}

async fn request(port: u16, raw: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

async fn get(port: u16, path: &str) -> String {
    request(
        port,
        &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
    )
    .await
}

async fn post(port: u16, path: &str, body: &str) -> String {
    request(
        port,
        &format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ),
    )
    .await
}

fn body_json(response: &str) -> Value {
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    serde_json::from_str(body).unwrap()
}

async fn wait_status(port: u16, id: &str, wanted: &str) -> Value {
    for _ in 0..500 {
        let record = body_json(&get(port, &format!("/jobs/{id}")).await);
        if record["status"] == wanted {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {wanted}");
}

#[tokio::test]
async fn health_responds() {
    let (handle, port, _dir) = start().await;
    let response = get(port, "/health").await;
    assert!(response.contains("200 OK"));
    assert!(response.contains("ok"));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn submit_then_poll_to_completion() {
    let (handle, port, _dir) = start().await;

    let response = post(
        port,
        "/jobs",
        r#"{"kind":"synapse_placement","args":{"count":20,"sections":4}}"#,
    )
    .await;
    assert!(response.contains("202 Accepted"));
    let submitted = body_json(&response);
    let id = submitted["id"].as_str().unwrap().to_owned();
    assert_eq!(submitted["kind"], "synapse_placement");

    let record = wait_status(port, &id, "succeeded").await;
    assert!(record["error"].is_null());
    assert!(record["started_at"].is_string());
    assert!(record["ended_at"].is_string());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn finished_job_streams_its_full_channel() {
    let (handle, port, _dir) = start().await;

    let submitted = body_json(
        &post(port, "/jobs", r#"{"kind":"mesh_analysis","args":{"vertices":256}}"#).await,
    );
    let id = submitted["id"].as_str().unwrap().to_owned();
    wait_status(port, &id, "succeeded").await;

    let response = get(port, &format!("/jobs/{id}/stream")).await;
    assert!(response.contains("application/x-ndjson"));
    assert!(response.contains(r#""state":"running""#));
    assert!(response.contains(r#""type":"data""#));
    assert!(response.contains(r#""state":"succeeded""#));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (handle, port, _dir) = start().await;
    assert!(get(port, "/jobs/no-such-job").await.contains("404"));
    assert!(get(port, "/jobs/no-such-job/stream").await.contains("404"));
    assert!(
        post(port, "/jobs/no-such-job/cancel", "").await.contains("404")
    );
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancel_is_accepted_for_known_jobs() {
    let (handle, port, _dir) = start().await;
    let submitted = body_json(
        &post(port, "/jobs", r#"{"kind":"mesh_analysis","args":{"vertices":64}}"#).await,
    );
    let id = submitted["id"].as_str().unwrap().to_owned();

    let response = post(port, &format!("/jobs/{id}/cancel"), "").await;
    assert!(response.contains("202 Accepted"));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn caller_supplied_id_is_idempotent() {
    let (handle, port, _dir) = start().await;
    let body = r#"{"kind":"synapse_placement","args":{"count":5},"id":"retry-1"}"#;

    let first = body_json(&post(port, "/jobs", body).await);
    wait_status(port, "retry-1", "succeeded").await;
    let second = body_json(&post(port, "/jobs", body).await);
    assert_eq!(first["id"], second["id"]);

    handle.shutdown().await.unwrap();
}
