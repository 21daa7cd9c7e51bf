//! Entity registry
//!
//! Holds topic and subscription definitions and enforces their existence and
//! uniqueness rules. It knows nothing about leases; the engine keeps the
//! queues next to it under the same lock.
//!
//! Entries are kept in `BTreeMap`s so list operations come back sorted by
//! name.

use std::collections::BTreeMap;

use crate::broker::topic::{Subscription, Topic};
use crate::utils::error::{BrokerError, BrokerResult};

#[derive(Debug, Default)]
pub struct Registry {
    topics: BTreeMap<String, Topic>,
    subscriptions: BTreeMap<String, Subscription>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(&mut self, name: &str) -> BrokerResult<Topic> {
        if self.topics.contains_key(name) {
            return Err(BrokerError::TopicAlreadyExists(name.to_string()));
        }
        let topic = Topic::new(name);
        self.topics.insert(name.to_string(), topic.clone());
        Ok(topic)
    }

    pub fn topic(&self, name: &str) -> BrokerResult<&Topic> {
        self.topics
            .get(name)
            .ok_or_else(|| BrokerError::TopicNotFound(name.to_string()))
    }

    /// Removes only the topic entry. Subscriptions bound to it stay
    /// registered and keep their queues.
    pub fn delete_topic(&mut self, name: &str) -> BrokerResult<()> {
        self.topics
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BrokerError::TopicNotFound(name.to_string()))
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.values()
    }

    pub fn create_subscription(&mut self, name: &str, topic: &str) -> BrokerResult<Subscription> {
        if self.subscriptions.contains_key(name) {
            return Err(BrokerError::SubscriptionAlreadyExists(name.to_string()));
        }
        self.topic(topic)?;

        let subscription = Subscription::new(name, topic);
        self.subscriptions
            .insert(name.to_string(), subscription.clone());
        Ok(subscription)
    }

    pub fn subscription(&self, name: &str) -> BrokerResult<&Subscription> {
        self.subscriptions
            .get(name)
            .ok_or_else(|| BrokerError::SubscriptionNotFound(name.to_string()))
    }

    pub fn delete_subscription(&mut self, name: &str) -> BrokerResult<()> {
        self.subscriptions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BrokerError::SubscriptionNotFound(name.to_string()))
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    /// Subscriptions currently bound to `topic`, the fan-out set for publish.
    pub fn subscriptions_for<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Subscription> {
        self.subscriptions
            .values()
            .filter(move |sub| sub.is_bound_to(topic))
    }
}
