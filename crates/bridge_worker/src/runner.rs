//! Worker runner: serves a kernel over NATS.
//!
//! The runner connects, announces itself, subscribes to its call subject
//! through a queue group and answers each request until it is told to stop.

use std::sync::Arc;

use anyhow::Result;
use bridge_net::connection::resolve_url;
use bridge_net::messages::WorkerAnnounce;
use bridge_net::subjects;
use bridge_spec::FunctionTable;
use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;
use crate::kernel::Kernel;

/// Turns a [`Kernel`] into a NATS-connected worker process.
#[derive(Debug)]
pub struct WorkerRunner {
    config: WorkerConfig,
    instance_id: String,
}

impl WorkerRunner {
    /// Create a new runner.
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Returns the unique instance ID for this runner.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Returns the worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Build the announcement published on startup.
    #[must_use]
    pub fn announcement(&self, table: &FunctionTable) -> WorkerAnnounce {
        WorkerAnnounce {
            name: self.config.name.clone(),
            instance_id: self.instance_id.clone(),
            functions: table.len(),
        }
    }

    /// Serve `kernel` until a stop request arrives or the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the NATS connection, subscription or a publish
    /// fails.
    pub async fn run<K: Kernel>(self, table: Arc<FunctionTable>, kernel: K) -> Result<()> {
        let url = resolve_url(self.config.nats_url.as_deref());
        info!(
            worker = self.config.name,
            instance_id = self.instance_id,
            url,
            "worker starting"
        );

        let client = async_nats::connect(url.as_str()).await?;

        let announce = bridge_net::encode(&self.announcement(&table))?;
        client
            .publish(subjects::WORKER_ANNOUNCE, announce.into())
            .await?;

        let subject = subjects::worker_call(&self.config.name);
        let mut calls = client
            .queue_subscribe(subject.clone(), subjects::queue_group(&self.config.name))
            .await?;
        info!(subject, "serving calls");

        let mut dispatcher = Dispatcher::new(table, kernel);
        while let Some(message) = calls.next().await {
            let Some(reply_to) = message.reply else {
                warn!(subject = %message.subject, "dropping call without reply subject");
                continue;
            };
            let reply = match dispatcher.handle(message.payload.as_ref()) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "dropping malformed frame");
                    continue;
                }
            };
            client.publish(reply_to, reply.into()).await?;
            if dispatcher.is_stopped() {
                break;
            }
        }

        client.flush().await?;
        info!(worker = self.config.name, "worker stopped");
        Ok(())
    }
}
