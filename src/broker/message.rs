//! Message definitions for the broker
//!
//! - `PublishMessage`: what a publisher hands in (payload + attributes).
//! - `Message`: the immutable published message, stamped by the broker with
//!   a `message_id` and `publish_time`. Shared read-only between the leases
//!   of every subscription it was fanned out to.
//! - `ReceivedMessage`: one granted lease as returned by pull.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishMessage {
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl PublishMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
    pub message_id: String,
    pub publish_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message: Arc<Message>,
}
