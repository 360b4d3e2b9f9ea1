//! Handler configuration values.
//!
//! Loading lives with the caller (the agent crate reads the environment);
//! this type only carries the values the protocol core consumes.

use std::time::Duration;

/// Tunables for the x402 handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfig {
    /// Ceiling on a single autonomous payment. Demands above this fail
    /// before any rail call is made.
    pub max_auto_payment: f64,
    /// Interval between settlement polls.
    pub poll_interval: Duration,
    /// Total settlement wait before giving up with a timeout error.
    pub settle_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_auto_payment: 10.0,
            poll_interval: Duration::from_secs(2),
            settle_timeout: Duration::from_secs(30),
        }
    }
}
