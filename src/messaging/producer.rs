use std::sync::Arc;

use serde::Serialize;

use crate::model::{Task, TranscodeRequest};

use super::broker::{Broker, BrokerError};

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

// ── Producers ──────────────────────────────────────────────────────────────────

/// Publishes JSON messages to one exchange under one routing key.
///
/// Cloning is cheap (Arc increment on the broker handle); every job can hold
/// its own clone and publish concurrently.
#[derive(Clone)]
struct JsonProducer {
    broker: Arc<dyn Broker>,
    exchange: String,
    routing_key: String,
}

impl JsonProducer {
    async fn publish<T: Serialize>(&self, message: &T) -> Result<(), ProducerError> {
        let body = serde_json::to_vec(message)?;
        self.broker
            .publish(&self.exchange, &self.routing_key, &body)
            .await?;
        Ok(())
    }
}

/// Enqueues Tasks on the primary work queue.
///
/// Routing key = primary queue name, matching the binding declared by the
/// worker.
#[derive(Clone)]
pub struct TaskProducer {
    inner: JsonProducer,
}

impl TaskProducer {
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            inner: JsonProducer {
                broker,
                exchange: exchange.into(),
                routing_key: queue.into(),
            },
        }
    }

    /// Declare the primary exchange so publishing works even before any
    /// worker has started.
    pub async fn declare(&self) -> Result<(), BrokerError> {
        self.inner.broker.declare_exchange(&self.inner.exchange).await
    }

    /// Publish one persistent Task.
    pub async fn publish(&self, task: &Task) -> Result<(), ProducerError> {
        self.inner.publish(task).await
    }
}

/// Sends transcode requests to the external transcoder.
#[derive(Clone)]
pub struct TranscodeProducer {
    inner: JsonProducer,
}

impl TranscodeProducer {
    pub fn new(
        broker: Arc<dyn Broker>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            inner: JsonProducer {
                broker,
                exchange: exchange.into(),
                routing_key: routing_key.into(),
            },
        }
    }

    pub fn exchange(&self) -> &str {
        &self.inner.exchange
    }

    pub async fn publish(&self, request: &TranscodeRequest) -> Result<(), ProducerError> {
        self.inner.publish(request).await
    }
}
