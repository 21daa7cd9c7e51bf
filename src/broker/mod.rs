pub mod clock;
pub mod engine;
pub mod ids;
pub mod lease;
pub mod message;
pub mod registry;
pub mod topic;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Broker, BrokerBuilder};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use message::{Message, PublishMessage, ReceivedMessage};
pub use topic::{Subscription, Topic};
