//! Configuration for the MSMP client

use std::time::Duration;

/// What happens to pending calls when the connection drops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPolicy {
    /// Leave entries outstanding; each resolves, is cancelled, or times out on its own
    #[default]
    Keep,
    /// Cancel every pending entry as soon as the drop is observed
    FailOnDisconnect,
}

/// Configuration for connecting to an MSMP server
#[derive(Debug, Clone)]
pub struct MsmpConfig {
    /// Server URL (e.g., "ws://localhost:25576")
    pub url: String,

    /// Management secret, sent as a bearer token
    pub secret: String,

    /// Whether to automatically reconnect on disconnect
    pub auto_reconnect: bool,

    /// Delay after a failed reconnect attempt
    pub reconnect_interval: Duration,

    /// How often the reconnect loop checks the connection state
    pub reconnect_poll_interval: Duration,

    /// Longest silence tolerated on the read side before the peer is considered dead
    pub read_timeout: Duration,

    /// Deadline for blocking calls
    pub call_timeout: Duration,

    /// Handling of pending calls on connection loss
    pub pending_policy: PendingPolicy,
}

impl MsmpConfig {
    /// Create a new configuration with the given URL and secret
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: secret.into(),
            auto_reconnect: true,
            reconnect_interval: Duration::from_secs(5),
            reconnect_poll_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
            pending_policy: PendingPolicy::Keep,
        }
    }

    /// Disable automatic reconnection
    pub fn no_reconnect(mut self) -> Self {
        self.auto_reconnect = false;
        self
    }

    /// Set the backoff after a failed reconnect and the state polling interval
    pub fn reconnect_interval(mut self, backoff: Duration, poll: Duration) -> Self {
        self.reconnect_interval = backoff;
        self.reconnect_poll_interval = poll;
        self
    }

    /// Set the read deadline
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the blocking call deadline
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set what happens to pending calls on connection loss
    pub fn pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.pending_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new_defaults() {
        let config = MsmpConfig::new("ws://localhost:25576", "test-secret");

        assert_eq!(config.url, "ws://localhost:25576");
        assert_eq!(config.secret, "test-secret");
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect_poll_interval, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.pending_policy, PendingPolicy::Keep);
    }

    #[test]
    fn test_config_no_reconnect() {
        let config = MsmpConfig::new("ws://localhost:25576", "secret").no_reconnect();

        assert!(!config.auto_reconnect);
    }

    #[test]
    fn test_config_reconnect_interval() {
        let config = MsmpConfig::new("ws://localhost:25576", "secret")
            .reconnect_interval(Duration::from_millis(500), Duration::from_millis(50));

        assert_eq!(config.reconnect_interval, Duration::from_millis(500));
        assert_eq!(config.reconnect_poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_config_builder_chain() {
        let config = MsmpConfig::new("ws://example.com:25576", "my-secret")
            .no_reconnect()
            .read_timeout(Duration::from_secs(10))
            .call_timeout(Duration::from_secs(5))
            .pending_policy(PendingPolicy::FailOnDisconnect);

        assert_eq!(config.url, "ws://example.com:25576");
        assert!(!config.auto_reconnect);
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.pending_policy, PendingPolicy::FailOnDisconnect);
    }
}
