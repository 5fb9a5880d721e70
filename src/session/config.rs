//! Relay configuration

use std::time::Duration;

/// Configuration for the relay engine
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Chunk slots in each connection's outbound queue (items, not bytes)
    ///
    /// When a consumer's queue is full, further chunks are dropped for that
    /// consumer only. Control events have a fixed reserve on top of this.
    pub outbound_capacity: usize,

    /// Maximum listeners per session (0 = unlimited)
    pub max_listeners: usize,

    /// Chat/gift entries kept per scope for replay
    pub history_capacity: usize,

    /// How often the idle-session sweep runs
    pub sweep_interval: Duration,

    /// Sessions with no listeners and no producer activity for this long are
    /// removed by the sweep
    pub idle_session_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            max_listeners: 0, // Unlimited
            history_capacity: 50,
            sweep_interval: Duration::from_secs(60),
            idle_session_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl RelayConfig {
    /// Set the per-connection outbound queue capacity
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Cap the number of listeners per session
    pub fn max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    /// Set how many chat/gift entries are kept for replay
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the idle session timeout
    pub fn idle_session_timeout(mut self, timeout: Duration) -> Self {
        self.idle_session_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.max_listeners, 0);
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.idle_session_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_outbound_capacity_floor() {
        let config = RelayConfig::default().outbound_capacity(0);
        assert_eq!(config.outbound_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .max_listeners(20)
            .history_capacity(100)
            .sweep_interval(Duration::from_secs(5))
            .idle_session_timeout(Duration::from_secs(30));

        assert_eq!(config.max_listeners, 20);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.idle_session_timeout, Duration::from_secs(30));
    }
}
