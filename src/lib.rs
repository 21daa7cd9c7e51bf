//! # PubSub Emulator
//!
//! `pubsub-emulator` is an in-memory emulator of a Pub/Sub style message
//! broker's data plane. Topics accept published messages, every subscription
//! receives its own ordered copy of each message published after it was
//! created, and consumers fetch messages with a pull/lease protocol giving
//! at-least-once delivery.
//!
//! ## Core Modules
//!
//! - `broker`: topic/subscription registry and the lease-based delivery engine.
//! - `config`: loading and merging server configuration.
//! - `transport`: the HTTP/JSON surface mirroring the emulated REST API.
//! - `utils`: error types and logging setup.
//!
//! Durable storage, push delivery, ordering keys, filtering, dead-lettering
//! and exactly-once delivery are not supported.

pub mod broker;
pub mod config;
pub mod transport;
pub mod utils;
