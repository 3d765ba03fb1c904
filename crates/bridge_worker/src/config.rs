//! Worker configuration.

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker name, as used in its call subject (e.g. `"evtwin"`).
    pub name: String,
    /// Optional NATS URL override (defaults to `NATS_URL` env or localhost).
    pub nats_url: Option<String>,
}

impl WorkerConfig {
    /// Create a config for the worker called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nats_url: None,
        }
    }

    /// Override the NATS URL for this worker.
    #[must_use]
    pub fn with_nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = Some(url.into());
        self
    }
}
