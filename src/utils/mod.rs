//! The `utils` module holds pieces shared across the emulator: the broker
//! error taxonomy and logging setup.

pub mod error;
pub mod logging;

pub use error::{BrokerError, BrokerResult};
