//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a gregor [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Period of the outbox worker's timer.
    pub outbox_interval: Duration,
    /// Deadline on the remote incremental sync call.
    pub sync_timeout: Duration,
    /// Deadline on the remote full state call.
    pub state_timeout: Duration,
}

impl ClientConfig {
    /// Sets the outbox flush interval.
    pub fn with_outbox_interval(mut self, interval: Duration) -> Self {
        self.outbox_interval = interval;
        self
    }

    /// Sets the sync call deadline.
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Sets the state call deadline.
    pub fn with_state_timeout(mut self, timeout: Duration) -> Self {
        self.state_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            outbox_interval: Duration::from_secs(60),
            sync_timeout: Duration::from_secs(1),
            state_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.outbox_interval, Duration::from_secs(60));
        assert_eq!(config.sync_timeout, Duration::from_secs(1));
        assert_eq!(config.state_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::default()
            .with_outbox_interval(Duration::from_millis(50))
            .with_sync_timeout(Duration::from_millis(200))
            .with_state_timeout(Duration::from_secs(2));

        assert_eq!(config.outbox_interval, Duration::from_millis(50));
        assert_eq!(config.sync_timeout, Duration::from_millis(200));
        assert_eq!(config.state_timeout, Duration::from_secs(2));
    }
}
