//! Topic and subscription definitions
//!
//! Both are identified by their full resource name
//! (`projects/{project}/topics/{topic}` and
//! `projects/{project}/subscriptions/{subscription}`). A subscription is
//! bound to its topic by name when it is created and never rebound.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    pub name: String,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub name: String,
    /// Name of the topic this subscription receives from. The topic may
    /// have been deleted since.
    pub topic: String,
}

impl Subscription {
    pub fn new(name: &str, topic: &str) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
        }
    }

    pub fn is_bound_to(&self, topic: &str) -> bool {
        self.topic == topic
    }
}
