//! Session configuration.

use std::time::Duration;

use bridge_net::{NatsTransport, NetError};

/// Default time to wait for a worker reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for connecting a session to a worker.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Worker name (e.g. `"huayno_worker"`); selects the call subject.
    pub worker: String,
    /// Optional NATS URL override (defaults to `NATS_URL` env or localhost).
    pub nats_url: Option<String>,
    /// How long one call may take before the worker counts as unresponsive.
    pub call_timeout: Duration,
}

impl SessionConfig {
    /// Create a config for the worker called `worker`.
    #[must_use]
    pub fn new(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            nats_url: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the NATS URL.
    #[must_use]
    pub fn with_nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = Some(url.into());
        self
    }

    /// Override the call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Open a NATS transport to the configured worker.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if the connection cannot be established.
    pub fn connect(&self) -> Result<NatsTransport, NetError> {
        NatsTransport::connect(&self.worker, self.nats_url.as_deref(), self.call_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("evtwin");
        assert_eq!(config.worker, "evtwin");
        assert!(config.nats_url.is_none());
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
    }

    #[test]
    fn test_overrides() {
        let config = SessionConfig::new("athena_worker")
            .with_nats_url("nats://bridge:4222")
            .with_call_timeout(Duration::from_millis(250));
        assert_eq!(config.nats_url.as_deref(), Some("nats://bridge:4222"));
        assert_eq!(config.call_timeout, Duration::from_millis(250));
    }
}
