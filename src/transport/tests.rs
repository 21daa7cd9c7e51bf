use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::TimeDelta;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{AppState, build_router};
use crate::broker::{Broker, ManualClock, SequentialIds};

fn test_app() -> (Router, Arc<Broker>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    let broker = Arc::new(
        Broker::builder()
            .ack_deadline(Duration::from_secs(10))
            .clock(clock.clone())
            .ids(Arc::new(SequentialIds::new("id")))
            .build(),
    );
    let app = build_router(AppState {
        broker: Arc::clone(&broker),
    });
    (app, broker, clock)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, Some(&body.to_string())).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn setup_topic_and_subscription(app: &Router) {
    let (status, _) = send(app, "PUT", "/v1/projects/test/topics/topic1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(
        app,
        "PUT",
        "/v1/projects/test/subscriptions/sub1",
        json!({ "topic": "projects/test/topics/topic1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn pull(app: &Router, max: i64) -> Vec<Value> {
    let (status, body) = send_json(
        app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:pull",
        json!({ "maxMessages": max }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["receivedMessages"].as_array().cloned().unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = test_app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_topic_crud() {
    let (app, _, _) = test_app();

    let (status, body) = send(&app, "PUT", "/v1/projects/test/topics/topic1", None).await;
    assert_eq!(status, StatusCode::OK);
    let topic: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(topic["name"], "projects/test/topics/topic1");

    let (status, _) = send(&app, "PUT", "/v1/projects/test/topics/topic1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "GET", "/v1/projects/test/topics/topic1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "DELETE", "/v1/projects/test/topics/topic1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, body) = send(&app, "GET", "/v1/projects/test/topics/topic1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let err: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"], "topic not found: projects/test/topics/topic1");
}

#[tokio::test]
async fn test_subscription_crud_and_errors() {
    let (app, _, _) = test_app();

    let (status, _) = send_json(
        &app,
        "PUT",
        "/v1/projects/test/subscriptions/sub1",
        json!({ "topic": "projects/test/topics/missing" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    setup_topic_and_subscription(&app).await;

    let (status, sub) = send_json(&app, "GET", "/v1/projects/test/subscriptions/sub1", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sub["name"], "projects/test/subscriptions/sub1");
    assert_eq!(sub["topic"], "projects/test/topics/topic1");

    let (status, _) = send_json(
        &app,
        "PUT",
        "/v1/projects/test/subscriptions/sub1",
        json!({ "topic": "projects/test/topics/topic1" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "DELETE", "/v1/projects/test/subscriptions/sub1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", "/v1/projects/test/subscriptions/sub1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters_by_project() {
    let (app, _, _) = test_app();
    send(&app, "PUT", "/v1/projects/project-a/topics/t1", None).await;
    send(&app, "PUT", "/v1/projects/project-a/topics/t2", None).await;
    send(&app, "PUT", "/v1/projects/project-b/topics/t1", None).await;
    send_json(
        &app,
        "PUT",
        "/v1/projects/project-b/subscriptions/s1",
        json!({ "topic": "projects/project-a/topics/t1" }),
    )
    .await;

    let (status, body) = send(&app, "GET", "/v1/projects/project-a/topics", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<&str> = listed["topics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["projects/project-a/topics/t1", "projects/project-a/topics/t2"]);

    let (_, body) = send(&app, "GET", "/v1/projects/project-a/subscriptions", None).await;
    let listed: Value = serde_json::from_slice(&body).unwrap();
    assert!(listed["subscriptions"].as_array().unwrap().is_empty());

    let (_, body) = send(&app, "GET", "/v1/projects/project-b/subscriptions", None).await;
    let listed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed["subscriptions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_publish_pull_acknowledge_flow() {
    let (app, broker, clock) = test_app();
    setup_topic_and_subscription(&app).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/v1/projects/test/topics/topic1:publish",
        json!({ "messages": [{ "data": "dGVzdA==", "attributes": { "k": "v" } }] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messageIds"], json!(["id-1"]));

    let received = pull(&app, 10).await;
    assert_eq!(received.len(), 1);
    let message = &received[0]["message"];
    assert_eq!(message["data"], "dGVzdA==");
    assert_eq!(message["attributes"]["k"], "v");
    assert_eq!(message["messageId"], "id-1");
    assert_eq!(message["publishTime"], "1970-01-01T00:00:00.000Z");
    let ack_id = received[0]["ackId"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:acknowledge",
        json!({ "ackIds": [ack_id] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    assert_eq!(broker.backlog("projects/test/subscriptions/sub1").unwrap(), 0);

    clock.advance(TimeDelta::seconds(11));
    assert!(pull(&app, 10).await.is_empty());
}

#[tokio::test]
async fn test_pull_normalizes_max_messages() {
    let (app, broker, _) = test_app();
    setup_topic_and_subscription(&app).await;
    send_json(
        &app,
        "POST",
        "/v1/projects/test/topics/topic1:publish",
        json!({ "messages": [{ "data": "YQ==" }, { "data": "Yg==" }, { "data": "Yw==" }] }),
    )
    .await;

    assert_eq!(pull(&app, 0).await.len(), 1);
    assert_eq!(pull(&app, -5).await.len(), 1);

    // missing maxMessages also means one
    let (_, body) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:pull",
        json!({}),
    )
    .await;
    assert_eq!(body["receivedMessages"].as_array().unwrap().len(), 1);
    assert_eq!(broker.backlog("projects/test/subscriptions/sub1").unwrap(), 3);
}

#[tokio::test]
async fn test_modify_ack_deadline_over_http() {
    let (app, _, clock) = test_app();
    setup_topic_and_subscription(&app).await;
    send_json(
        &app,
        "POST",
        "/v1/projects/test/topics/topic1:publish",
        json!({ "messages": [{ "data": "dGVzdA==" }] }),
    )
    .await;
    let ack_id = pull(&app, 1).await[0]["ackId"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:modifyAckDeadline",
        json!({ "ackIds": [ack_id], "ackDeadlineSeconds": 30 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    clock.advance(TimeDelta::seconds(15));
    assert!(pull(&app, 1).await.is_empty());

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:modifyAckDeadline",
        json!({ "ackIds": [ack_id], "ackDeadlineSeconds": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let again = pull(&app, 1).await;
    assert_eq!(again[0]["ackId"], ack_id.as_str());

    send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:acknowledge",
        json!({ "ackIds": [ack_id] }),
    )
    .await;
    let (status, body) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:modifyAckDeadline",
        json!({ "ackIds": [ack_id], "ackDeadlineSeconds": 10 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid ack id"));

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:modifyAckDeadline",
        json!({ "ackIds": [], "ackDeadlineSeconds": -1 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_resources_are_not_found() {
    let (app, _, _) = test_app();

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/projects/test/topics/nonexistent:publish",
        json!({ "messages": [{ "data": "dGVzdA==" }] }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/nonexistent:pull",
        json!({ "maxMessages": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/nonexistent:acknowledge",
        json!({ "ackIds": ["x"] }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/v1/invalid/path", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let (app, _, _) = test_app();
    send(&app, "PUT", "/v1/projects/test/topics/topic1", None).await;

    let (status, _) = send(
        &app,
        "PUT",
        "/v1/projects/test/subscriptions/sub1",
        Some("{invalid json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/v1/projects/test/topics/topic1:publish",
        Some("not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_json(
        &app,
        "POST",
        "/v1/projects/test/topics/topic1:publish",
        json!({ "messages": [{ "data": "%%% not base64" }] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("base64"));
}

#[tokio::test]
async fn test_unsupported_methods() {
    let (app, _, _) = test_app();

    let (status, _) = send(&app, "POST", "/v1/projects/test/topics/topic1", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(&app, "GET", "/v1/projects/test/topics/topic1:publish", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(&app, "POST", "/v1/projects/test/topics", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(&app, "POST", "/v1/projects/test/subscriptions", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/sub1:seek",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failures_are_logged_with_error_kind() {
    let (app, _, _) = test_app();
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    send(&app, "PUT", "/v1/projects/test/topics/topic1", None).await;
    let (status, _) = send(&app, "PUT", "/v1/projects/test/topics/topic1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send_json(
        &app,
        "POST",
        "/v1/projects/test/subscriptions/nope:acknowledge",
        json!({ "ackIds": ["x"] }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("kind=\"topic_already_exists\""), "{output}");
    assert!(output.contains("kind=\"subscription_not_found\""), "{output}");
}
