//! JSON request and response bodies of the REST surface.
//!
//! Field names follow the emulated API (camelCase). Message payloads travel
//! base64-encoded with the standard alphabet.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::broker::{PublishMessage, ReceivedMessage, Subscription, Topic};

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub topic: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PubsubMessage {
    /// Base64 payload.
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, String>>,
}

impl PubsubMessage {
    pub fn decode(self) -> Result<PublishMessage, base64::DecodeError> {
        Ok(PublishMessage {
            data: STANDARD.decode(self.data.as_bytes())?,
            attributes: self.attributes.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub messages: Vec<PubsubMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub message_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    #[serde(default)]
    pub max_messages: i64,
}

impl PullRequest {
    /// Non-positive values ask for a single message.
    pub fn effective_max(&self) -> usize {
        usize::try_from(self.max_messages).ok().filter(|n| *n > 0).unwrap_or(1)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub data: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
    pub message_id: String,
    /// RFC 3339, UTC.
    pub publish_time: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireReceivedMessage {
    pub ack_id: String,
    pub message: WireMessage,
}

impl From<ReceivedMessage> for WireReceivedMessage {
    fn from(received: ReceivedMessage) -> Self {
        let msg = &received.message;
        Self {
            message: WireMessage {
                data: STANDARD.encode(&msg.data),
                attributes: msg.attributes.clone(),
                message_id: msg.message_id.clone(),
                publish_time: msg
                    .publish_time
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            },
            ack_id: received.ack_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub received_messages: Vec<WireReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    #[serde(default)]
    pub ack_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyAckDeadlineRequest {
    #[serde(default)]
    pub ack_ids: Vec<String>,
    #[serde(default)]
    pub ack_deadline_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct ListTopicsResponse {
    pub topics: Vec<Topic>,
}

#[derive(Debug, Serialize)]
pub struct ListSubscriptionsResponse {
    pub subscriptions: Vec<Subscription>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
