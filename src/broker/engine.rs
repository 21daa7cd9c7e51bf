//! Broker engine
//!
//! This module contains the in-memory delivery engine responsible for:
//! - managing topics and subscriptions through the `Registry`
//! - fanning published messages out into one lease per bound subscription
//! - granting leases on pull and redelivering them once their deadline passes
//! - acknowledging (and pruning) leases and moving their deadlines
//!
//! Concurrency and usage notes:
//! - All registry and queue state sits behind a single `RwLock`. Mutations
//!   take the write lock, get/list/backlog take the read lock. Two pulls can
//!   therefore never grant the same lease, and an ack can never interleave
//!   with a pull on the same queue.
//! - Every operation is synchronous and non-blocking: pull returns whatever is
//!   eligible right now. Share the broker between request handlers with
//!   `Arc<Broker>`; no outer lock is needed.
//! - Time and identifiers come from the injected `Clock` and `IdGenerator`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::TimeDelta;
use tracing::{debug, warn};

use crate::broker::clock::{Clock, SystemClock};
use crate::broker::ids::{IdGenerator, UuidGenerator};
use crate::broker::lease::Lease;
use crate::broker::message::{Message, PublishMessage, ReceivedMessage};
use crate::broker::registry::Registry;
use crate::broker::topic::{Subscription, Topic};
use crate::config::BrokerSettings;
use crate::utils::error::{BrokerError, BrokerResult};

#[derive(Debug, Default)]
struct State {
    registry: Registry,
    queues: HashMap<String, VecDeque<Lease>>,
}

impl State {
    fn queue(&self, subscription: &str) -> BrokerResult<&VecDeque<Lease>> {
        self.registry.subscription(subscription)?;
        self.queues
            .get(subscription)
            .ok_or_else(|| missing_queue(subscription))
    }

    fn queue_mut(&mut self, subscription: &str) -> BrokerResult<&mut VecDeque<Lease>> {
        self.registry.subscription(subscription)?;
        self.queues
            .get_mut(subscription)
            .ok_or_else(|| missing_queue(subscription))
    }
}

fn missing_queue(subscription: &str) -> BrokerError {
    let err = BrokerError::MissingQueue(subscription.to_string());
    warn!(subscription, kind = err.as_label(), "registered subscription has no lease queue");
    err
}

#[derive(Debug)]
pub struct Broker {
    state: RwLock<State>,
    ack_deadline: TimeDelta,
    strict_acknowledge: bool,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Broker {
    /// Lease duration granted by pull unless configured otherwise.
    pub const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        BrokerBuilder::default().build()
    }

    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::default()
    }

    pub fn from_settings(settings: &BrokerSettings) -> Self {
        Self::builder()
            .ack_deadline(Duration::from_secs(settings.ack_deadline_secs))
            .strict_acknowledge(settings.strict_acknowledge)
            .build()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_topic(&self, name: &str) -> BrokerResult<Topic> {
        self.write().registry.create_topic(name)
    }

    pub fn get_topic(&self, name: &str) -> BrokerResult<Topic> {
        self.read().registry.topic(name).cloned()
    }

    /// Deletes the topic only. Subscriptions bound to it keep their queues and
    /// can still be pulled from and acknowledged.
    pub fn delete_topic(&self, name: &str) -> BrokerResult<()> {
        self.write().registry.delete_topic(name)
    }

    pub fn list_topics(&self) -> Vec<Topic> {
        self.read().registry.topics().cloned().collect()
    }

    pub fn create_subscription(&self, name: &str, topic: &str) -> BrokerResult<Subscription> {
        let mut state = self.write();
        let subscription = state.registry.create_subscription(name, topic)?;
        state.queues.insert(name.to_string(), VecDeque::new());
        Ok(subscription)
    }

    pub fn get_subscription(&self, name: &str) -> BrokerResult<Subscription> {
        self.read().registry.subscription(name).cloned()
    }

    /// Deletes the subscription together with every lease still queued on it.
    pub fn delete_subscription(&self, name: &str) -> BrokerResult<()> {
        let mut state = self.write();
        state.registry.delete_subscription(name)?;
        state.queues.remove(name);
        Ok(())
    }

    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        self.read().registry.subscriptions().cloned().collect()
    }

    /// Publishes a batch to `topic` and returns one message id per message,
    /// in batch order.
    ///
    /// Each subscription currently bound to the topic gets its own lease per
    /// message, appended in batch order and visible immediately. With no
    /// bound subscriptions the ids are still returned but nothing is stored.
    pub fn publish(&self, topic: &str, messages: Vec<PublishMessage>) -> BrokerResult<Vec<String>> {
        let mut guard = self.write();
        let state = &mut *guard;
        state.registry.topic(topic)?;

        let targets: Vec<&str> = state
            .registry
            .subscriptions_for(topic)
            .map(|sub| sub.name.as_str())
            .collect();
        if let Some(orphan) = targets.iter().find(|name| !state.queues.contains_key(**name)) {
            return Err(missing_queue(orphan));
        }

        let now = self.clock.now();
        let published: Vec<Arc<Message>> = messages
            .into_iter()
            .map(|msg| {
                Arc::new(Message {
                    data: msg.data,
                    attributes: msg.attributes,
                    message_id: self.ids.next_id(),
                    publish_time: now,
                })
            })
            .collect();

        for name in &targets {
            if let Some(queue) = state.queues.get_mut(*name) {
                queue.extend(
                    published
                        .iter()
                        .map(|msg| Lease::new(Arc::clone(msg), self.ids.next_id())),
                );
            }
        }

        debug!(
            topic,
            message_count = published.len(),
            fan_out = targets.len(),
            "fanned out publish"
        );
        Ok(published.iter().map(|m| m.message_id.clone()).collect())
    }

    /// Grants up to `max_messages` visible leases, oldest first.
    ///
    /// Each granted lease stays invisible for the configured ack deadline.
    /// An empty result is not an error.
    pub fn pull(&self, subscription: &str, max_messages: usize) -> BrokerResult<Vec<ReceivedMessage>> {
        let mut state = self.write();
        let queue = state.queue_mut(subscription)?;

        let now = self.clock.now();
        let granted: Vec<ReceivedMessage> = queue
            .iter_mut()
            .filter(|lease| lease.is_visible(now))
            .take(max_messages)
            .map(|lease| lease.grant(now, self.ack_deadline))
            .collect();

        debug!(subscription, granted = granted.len(), "granted leases");
        Ok(granted)
    }

    /// Acknowledges and prunes the leases named by `ack_ids`.
    ///
    /// Unknown ids are ignored unless the broker was built with
    /// `strict_acknowledge`, in which case any unknown id rejects the whole
    /// call before anything is acknowledged.
    pub fn acknowledge(&self, subscription: &str, ack_ids: &[String]) -> BrokerResult<()> {
        let mut state = self.write();
        let queue = state.queue_mut(subscription)?;
        if self.strict_acknowledge {
            ensure_pending(subscription, queue, ack_ids)?;
        }

        let now = self.clock.now();
        let wanted: HashSet<&str> = ack_ids.iter().map(String::as_str).collect();
        queue
            .iter_mut()
            .filter(|lease| wanted.contains(lease.ack_id.as_str()))
            .for_each(|lease| lease.acknowledge(now));

        let before = queue.len();
        queue.retain(Lease::is_pending);
        debug!(subscription, pruned = before - queue.len(), "acknowledged leases");
        Ok(())
    }

    /// Sets the deadline of every named lease to `now + ack_deadline_secs`.
    ///
    /// Zero makes the leases visible again right away. Fails without touching
    /// any lease if one of the ids is not a pending lease of the subscription.
    pub fn modify_ack_deadline(
        &self,
        subscription: &str,
        ack_ids: &[String],
        ack_deadline_secs: u64,
    ) -> BrokerResult<()> {
        let mut state = self.write();
        let queue = state.queue_mut(subscription)?;
        ensure_pending(subscription, queue, ack_ids)?;

        let now = self.clock.now();
        let extension = i64::try_from(ack_deadline_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let wanted: HashSet<&str> = ack_ids.iter().map(String::as_str).collect();
        queue
            .iter_mut()
            .filter(|lease| wanted.contains(lease.ack_id.as_str()))
            .for_each(|lease| lease.extend(now, extension));
        Ok(())
    }

    /// Number of unacknowledged leases queued on `subscription`.
    pub fn backlog(&self, subscription: &str) -> BrokerResult<usize> {
        let state = self.read();
        Ok(state.queue(subscription)?.len())
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_pending(subscription: &str, queue: &VecDeque<Lease>, ack_ids: &[String]) -> BrokerResult<()> {
    let pending: HashSet<&str> = queue
        .iter()
        .filter(|lease| lease.is_pending())
        .map(|lease| lease.ack_id.as_str())
        .collect();

    match ack_ids.iter().find(|id| !pending.contains(id.as_str())) {
        Some(ack_id) => Err(BrokerError::InvalidLeaseToken {
            subscription: subscription.to_string(),
            ack_id: ack_id.clone(),
        }),
        None => Ok(()),
    }
}

/// Builder for [`Broker`]. Defaults: 10 second ack deadline, lenient
/// acknowledge, wall clock, UUID identifiers.
#[derive(Debug)]
pub struct BrokerBuilder {
    ack_deadline: Duration,
    strict_acknowledge: bool,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self {
            ack_deadline: Broker::DEFAULT_ACK_DEADLINE,
            strict_acknowledge: false,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
        }
    }
}

impl BrokerBuilder {
    pub fn ack_deadline(mut self, ack_deadline: Duration) -> Self {
        self.ack_deadline = ack_deadline;
        self
    }

    pub fn strict_acknowledge(mut self, strict: bool) -> Self {
        self.strict_acknowledge = strict;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn build(self) -> Broker {
        Broker {
            state: RwLock::new(State::default()),
            ack_deadline: TimeDelta::from_std(self.ack_deadline).unwrap_or(TimeDelta::MAX),
            strict_acknowledge: self.strict_acknowledge,
            clock: self.clock,
            ids: self.ids,
        }
    }
}
