//! Per-subscription delivery record.
//!
//! A `Lease` wraps one fanned-out copy of a message. Its effective state is
//! fully determined by two fields:
//! - `acked_at`: once set the lease is terminal and gets pruned from its queue
//! - `deadline`: the lease is not redelivered before this instant
//!
//! A lease is visible to pull iff it is unacknowledged and `now >= deadline`.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::broker::message::{Message, ReceivedMessage};

#[derive(Debug, Clone)]
pub struct Lease {
    pub message: Arc<Message>,
    pub ack_id: String,
    pub acked_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
}

impl Lease {
    /// A fresh lease whose deadline lies before any instant the clock can
    /// report, so it is visible to the very next pull.
    pub fn new(message: Arc<Message>, ack_id: String) -> Self {
        Self {
            message,
            ack_id,
            acked_at: None,
            deadline: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.acked_at.is_none()
    }

    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now >= self.deadline
    }

    /// Hand the lease to a puller until `now + duration`.
    pub fn grant(&mut self, now: DateTime<Utc>, duration: TimeDelta) -> ReceivedMessage {
        self.extend(now, duration);
        ReceivedMessage {
            ack_id: self.ack_id.clone(),
            message: Arc::clone(&self.message),
        }
    }

    /// Move the deadline to `now + duration`, replacing whatever was granted
    /// before. A zero duration makes the lease visible again immediately.
    pub fn extend(&mut self, now: DateTime<Utc>, duration: TimeDelta) {
        self.deadline = now
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    pub fn acknowledge(&mut self, now: DateTime<Utc>) {
        self.acked_at.get_or_insert(now);
    }
}
