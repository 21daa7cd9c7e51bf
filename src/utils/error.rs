//! Error types for the broker.
//!
//! Every engine operation returns a [`BrokerResult`]. None of these errors are
//! retried by the broker itself; retry policy belongs to the consumer.

use thiserror::Error;

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("subscription already exists: {0}")]
    SubscriptionAlreadyExists(String),

    /// A token passed to modify-deadline (or to a strict acknowledge) does
    /// not match a pending lease of the subscription.
    #[error("invalid ack id for subscription {subscription}: {ack_id}")]
    InvalidLeaseToken { subscription: String, ack_id: String },

    /// The subscription is registered but its lease queue is gone. This is a
    /// bookkeeping bug, not a client error.
    #[error("no message queue for subscription {0}")]
    MissingQueue(String),
}

impl BrokerError {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::TopicNotFound(_) => "topic_not_found",
            BrokerError::TopicAlreadyExists(_) => "topic_already_exists",
            BrokerError::SubscriptionNotFound(_) => "subscription_not_found",
            BrokerError::SubscriptionAlreadyExists(_) => "subscription_already_exists",
            BrokerError::InvalidLeaseToken { .. } => "invalid_lease_token",
            BrokerError::MissingQueue(_) => "missing_queue",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BrokerError::TopicNotFound(_) | BrokerError::SubscriptionNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            BrokerError::TopicAlreadyExists(_) | BrokerError::SubscriptionAlreadyExists(_)
        )
    }
}
