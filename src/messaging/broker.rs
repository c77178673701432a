use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),
    #[error("broker channel error: {0}")]
    Channel(String),
    #[error("topology declaration failed: {0}")]
    Topology(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("consume failed: {0}")]
    Consume(String),
    #[error("acknowledgement failed: {0}")]
    Ack(String),
    #[error("queue delete failed: {0}")]
    Delete(String),
}

// ── Topology ───────────────────────────────────────────────────────────────────

/// How long a declared queue should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Survives broker restarts. Used for the primary work queue.
    Durable,
    /// Non-durable, auto-deleted once its last consumer goes away.
    /// Used for per-request reply queues, which are also deleted explicitly.
    Ephemeral,
}

// ── Delivery ───────────────────────────────────────────────────────────────────

/// Settles one delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;
    async fn reject(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// A message received from a queue, pending manual acknowledgement.
pub struct Delivery {
    pub data: Vec<u8>,
    pub routing_key: String,
    /// `true` when the broker has delivered this message before.
    pub redelivered: bool,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        data: Vec<u8>,
        routing_key: impl Into<String>,
        redelivered: bool,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            data,
            routing_key: routing_key.into(),
            redelivered,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    pub async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.reject(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Stream of deliveries from one consumer. Ends when the queue is deleted or
/// the channel closes.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

// ── Broker ─────────────────────────────────────────────────────────────────────

/// The subset of an AMQP broker the pipeline relies on.
///
/// Implementations must be safe to share across tasks: the orchestrator hands
/// one `Arc<dyn Broker>` to every in-flight job.
///
/// All exchanges are durable and of kind `direct`.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError>;

    async fn declare_queue(&self, name: &str, kind: QueueKind) -> Result<(), BrokerError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// Publish a persistent `application/json` message. Unroutable messages
    /// are dropped silently.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BrokerError>;

    /// Start a manual-ack consumer on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, BrokerError>;

    /// Delete `queue` regardless of consumers or pending messages.
    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError>;
}

/// Declare a durable queue and bind it to `exchange` using the queue's own
/// name as routing key.
pub async fn declare_bound_queue(
    broker: &dyn Broker,
    exchange: &str,
    queue: &str,
    kind: QueueKind,
) -> Result<(), BrokerError> {
    broker.declare_queue(queue, kind).await?;
    broker.bind_queue(queue, exchange, queue).await
}
