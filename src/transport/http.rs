//! HTTP transport
//!
//! Maps the REST surface of the emulated service onto broker operations:
//! - builds full resource names from the `{project}` / `{id}` path segments
//! - decodes JSON bodies (and base64 payloads) and encodes responses
//! - translates `BrokerError`s into status codes via `ApiError`
//! - logs every mutating operation with structured fields
//!
//! Custom methods use the `{id}:{action}` form, e.g.
//! `POST /v1/projects/p/subscriptions/s:pull`. The router captures the whole
//! last segment and the handlers split the action off.

use std::future::Future;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::broker::{Broker, PublishMessage, Subscription, Topic};
use crate::transport::error::ApiError;
use crate::transport::message::{
    AcknowledgeRequest, CreateSubscriptionRequest, ListSubscriptionsResponse, ListTopicsResponse,
    ModifyAckDeadlineRequest, PublishRequest, PublishResponse, PubsubMessage, PullRequest,
    PullResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
}

pub fn topic_name(project: &str, topic: &str) -> String {
    format!("projects/{project}/topics/{topic}")
}

pub fn subscription_name(project: &str, subscription: &str) -> String {
    format!("projects/{project}/subscriptions/{subscription}")
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/projects/:project/topics", get(list_topics))
        .route(
            "/v1/projects/:project/topics/:topic",
            get(get_topic)
                .put(create_topic)
                .delete(delete_topic)
                .post(topic_action),
        )
        .route("/v1/projects/:project/subscriptions", get(list_subscriptions))
        .route(
            "/v1/projects/:project/subscriptions/:subscription",
            get(get_subscription)
                .put(create_subscription)
                .delete(delete_subscription)
                .post(subscription_action),
        )
        .with_state(state)
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn start_http_server<F>(addr: &str, broker: Arc<Broker>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "pubsub emulator listening");

    let app = build_router(AppState { broker });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "OK"
}

fn split_action(segment: &str) -> (&str, Option<&str>) {
    match segment.split_once(':') {
        Some((id, action)) => (id, Some(action)),
        None => (segment, None),
    }
}

/// Custom methods are POST-only; anything else aimed at `{id}:{action}` is 405.
fn plain_id(segment: &str) -> Result<&str, ApiError> {
    match split_action(segment) {
        (id, None) => Ok(id),
        (_, Some(_)) => Err(ApiError::method_not_allowed()),
    }
}

fn parse_body<T: DeserializeOwned>(operation: &'static str, resource: &str, body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        error!(operation, resource, error = %err, "invalid request body");
        ApiError::bad_request("Invalid request body")
    })
}

async fn create_topic(
    State(state): State<AppState>,
    Path((project, segment)): Path<(String, String)>,
) -> Result<Json<Topic>, ApiError> {
    let name = topic_name(&project, plain_id(&segment)?);
    let topic = state.broker.create_topic(&name).inspect_err(|err| {
        error!(
            operation = "create_topic",
            topic = %name,
            kind = err.as_label(),
            error = %err,
            "failed to create topic"
        );
    })?;

    info!(operation = "create_topic", topic = %name, "topic created");
    Ok(Json(topic))
}

async fn get_topic(
    State(state): State<AppState>,
    Path((project, segment)): Path<(String, String)>,
) -> Result<Json<Topic>, ApiError> {
    let name = topic_name(&project, plain_id(&segment)?);
    Ok(Json(state.broker.get_topic(&name)?))
}

async fn delete_topic(
    State(state): State<AppState>,
    Path((project, segment)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let name = topic_name(&project, plain_id(&segment)?);
    state.broker.delete_topic(&name).inspect_err(|err| {
        error!(
            operation = "delete_topic",
            topic = %name,
            kind = err.as_label(),
            error = %err,
            "failed to delete topic"
        );
    })?;

    info!(operation = "delete_topic", topic = %name, "topic deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_topics(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Json<ListTopicsResponse> {
    let prefix = topic_name(&project, "");
    let topics: Vec<Topic> = state
        .broker
        .list_topics()
        .into_iter()
        .filter(|t| t.name.starts_with(&prefix))
        .collect();

    info!(operation = "list_topics", project = %project, count = topics.len(), "listed topics");
    Json(ListTopicsResponse { topics })
}

async fn topic_action(
    State(state): State<AppState>,
    Path((project, segment)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (topic, action) = split_action(&segment);
    let name = topic_name(&project, topic);
    match action {
        Some("publish") => publish(&state, &name, &body).map(|r| Json(r).into_response()),
        Some(other) => Err(ApiError::not_found(format!("unknown topic method: {other}"))),
        None => Err(ApiError::method_not_allowed()),
    }
}

fn publish(state: &AppState, topic: &str, body: &[u8]) -> Result<PublishResponse, ApiError> {
    let req: PublishRequest = parse_body("publish", topic, body)?;
    let message_count = req.messages.len();
    let messages = req
        .messages
        .into_iter()
        .map(PubsubMessage::decode)
        .collect::<Result<Vec<PublishMessage>, _>>()
        .map_err(|err| {
            error!(operation = "publish", topic, error = %err, "invalid message data");
            ApiError::bad_request("Invalid message data: expected base64")
        })?;

    let message_ids = state.broker.publish(topic, messages).inspect_err(|err| {
        error!(
            operation = "publish",
            topic,
            message_count,
            kind = err.as_label(),
            error = %err,
            "failed to publish"
        );
    })?;

    info!(
        operation = "publish",
        topic,
        message_count = message_ids.len(),
        message_ids = ?message_ids,
        "published"
    );
    Ok(PublishResponse { message_ids })
}

async fn create_subscription(
    State(state): State<AppState>,
    Path((project, segment)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Subscription>, ApiError> {
    let name = subscription_name(&project, plain_id(&segment)?);
    let req: CreateSubscriptionRequest = parse_body("create_subscription", &name, &body)?;

    let subscription = state
        .broker
        .create_subscription(&name, &req.topic)
        .inspect_err(|err| {
            error!(
                operation = "create_subscription",
                subscription = %name,
                topic = %req.topic,
                kind = err.as_label(),
                error = %err,
                "failed to create subscription"
            );
        })?;

    info!(
        operation = "create_subscription",
        subscription = %name,
        topic = %req.topic,
        "subscription created"
    );
    Ok(Json(subscription))
}

async fn get_subscription(
    State(state): State<AppState>,
    Path((project, segment)): Path<(String, String)>,
) -> Result<Json<Subscription>, ApiError> {
    let name = subscription_name(&project, plain_id(&segment)?);
    Ok(Json(state.broker.get_subscription(&name)?))
}

async fn delete_subscription(
    State(state): State<AppState>,
    Path((project, segment)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let name = subscription_name(&project, plain_id(&segment)?);
    state.broker.delete_subscription(&name).inspect_err(|err| {
        error!(
            operation = "delete_subscription",
            subscription = %name,
            kind = err.as_label(),
            error = %err,
            "failed to delete subscription"
        );
    })?;

    info!(operation = "delete_subscription", subscription = %name, "subscription deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_subscriptions(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Json<ListSubscriptionsResponse> {
    let prefix = subscription_name(&project, "");
    let subscriptions: Vec<Subscription> = state
        .broker
        .list_subscriptions()
        .into_iter()
        .filter(|s| s.name.starts_with(&prefix))
        .collect();

    info!(
        operation = "list_subscriptions",
        project = %project,
        count = subscriptions.len(),
        "listed subscriptions"
    );
    Json(ListSubscriptionsResponse { subscriptions })
}

async fn subscription_action(
    State(state): State<AppState>,
    Path((project, segment)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (subscription, action) = split_action(&segment);
    let name = subscription_name(&project, subscription);
    match action {
        Some("pull") => pull(&state, &name, &body).map(|r| Json(r).into_response()),
        Some("acknowledge") => {
            acknowledge(&state, &name, &body).map(|()| Json(json!({})).into_response())
        }
        Some("modifyAckDeadline") => {
            modify_ack_deadline(&state, &name, &body).map(|()| Json(json!({})).into_response())
        }
        Some(other) => Err(ApiError::not_found(format!(
            "unknown subscription method: {other}"
        ))),
        None => Err(ApiError::method_not_allowed()),
    }
}

fn pull(state: &AppState, subscription: &str, body: &[u8]) -> Result<PullResponse, ApiError> {
    let req: PullRequest = parse_body("pull", subscription, body)?;
    let max_messages = req.effective_max();

    let received = state
        .broker
        .pull(subscription, max_messages)
        .inspect_err(|err| {
            error!(
                operation = "pull",
                subscription,
                max_messages,
                kind = err.as_label(),
                error = %err,
                "failed to pull"
            );
        })?;

    info!(
        operation = "pull",
        subscription,
        max_messages,
        message_count = received.len(),
        "pulled"
    );
    Ok(PullResponse {
        received_messages: received.into_iter().map(Into::into).collect(),
    })
}

fn acknowledge(state: &AppState, subscription: &str, body: &[u8]) -> Result<(), ApiError> {
    let req: AcknowledgeRequest = parse_body("acknowledge", subscription, body)?;
    let ack_id_count = req.ack_ids.len();

    state
        .broker
        .acknowledge(subscription, &req.ack_ids)
        .inspect_err(|err| {
            error!(
                operation = "acknowledge",
                subscription,
                ack_id_count,
                kind = err.as_label(),
                error = %err,
                "failed to acknowledge"
            );
        })?;

    info!(operation = "acknowledge", subscription, ack_id_count, "acknowledged");
    Ok(())
}

fn modify_ack_deadline(state: &AppState, subscription: &str, body: &[u8]) -> Result<(), ApiError> {
    let req: ModifyAckDeadlineRequest = parse_body("modify_ack_deadline", subscription, body)?;
    let ack_deadline_seconds = u64::try_from(req.ack_deadline_seconds)
        .map_err(|_| ApiError::bad_request("ackDeadlineSeconds must not be negative"))?;
    let ack_id_count = req.ack_ids.len();

    state
        .broker
        .modify_ack_deadline(subscription, &req.ack_ids, ack_deadline_seconds)
        .inspect_err(|err| {
            error!(
                operation = "modify_ack_deadline",
                subscription,
                ack_id_count,
                ack_deadline_seconds,
                kind = err.as_label(),
                error = %err,
                "failed to modify ack deadline"
            );
        })?;

    info!(
        operation = "modify_ack_deadline",
        subscription,
        ack_id_count,
        ack_deadline_seconds,
        "modified ack deadline"
    );
    Ok(())
}
