//! The `transport` module exposes the broker over HTTP with the JSON
//! resource layout of the emulated Pub/Sub REST API.
//!
//! It owns everything the engine deliberately does not: resource-name
//! construction, JSON and base64 encoding, status-code mapping and request
//! logging.

pub mod error;
pub mod http;
pub mod message;

pub use http::{AppState, build_router, start_http_server};

#[cfg(test)]
mod tests;
