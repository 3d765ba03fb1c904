//! NATS request/reply transport.
//!
//! Wraps an `async-nats` client behind the blocking [`Transport`] interface.
//! The transport owns a single-threaded tokio runtime and drives each
//! request to completion before returning.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::NetError;
use crate::subjects;
use crate::transport::Transport;

/// Default NATS server URL.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// The environment variable used to override the NATS URL.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// Resolve the server URL: an explicit override, then `NATS_URL`, then
/// [`DEFAULT_NATS_URL`].
#[must_use]
pub fn resolve_url(explicit: Option<&str>) -> String {
    explicit.map_or_else(
        || std::env::var(NATS_URL_ENV).unwrap_or_else(|_| DEFAULT_NATS_URL.to_string()),
        str::to_string,
    )
}

/// A [`Transport`] that sends frames as NATS requests to one worker.
#[derive(Debug)]
pub struct NatsTransport {
    runtime: tokio::runtime::Runtime,
    client: Option<async_nats::Client>,
    subject: String,
    timeout: Duration,
}

impl NatsTransport {
    /// Connect to NATS and target the worker called `worker_name`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Runtime`] if the runtime cannot be built, or
    /// [`NetError::Connect`] if the connection cannot be established.
    pub fn connect(
        worker_name: &str,
        url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, NetError> {
        let url = resolve_url(url);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        info!(url, worker = worker_name, "connecting to NATS");
        let client = runtime.block_on(async_nats::connect(url.as_str()))?;
        info!("NATS connection established");
        Ok(Self {
            runtime,
            client: Some(client),
            subject: subjects::worker_call(worker_name),
            timeout,
        })
    }

    /// The subject requests are sent on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl Transport for NatsTransport {
    fn send(&mut self, frame: &[u8]) -> Result<Vec<u8>, NetError> {
        let client = self.client.as_ref().ok_or(NetError::Closed)?;
        let request = client.request(self.subject.clone(), frame.to_vec().into());
        let reply = self
            .runtime
            .block_on(async { tokio::time::timeout(self.timeout, request).await });
        match reply {
            Ok(Ok(message)) => {
                debug!(subject = %self.subject, bytes = message.payload.len(), "reply received");
                Ok(message.payload.to_vec())
            }
            Ok(Err(e)) => Err(NetError::Request(e)),
            Err(_) => {
                warn!(subject = %self.subject, timeout = ?self.timeout, "request timed out");
                Err(NetError::Timeout {
                    subject: self.subject.clone(),
                    after: self.timeout,
                })
            }
        }
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            info!(subject = %self.subject, "NATS transport closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_url_wins() {
        assert_eq!(resolve_url(Some("nats://example:4333")), "nats://example:4333");
    }
}
