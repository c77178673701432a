use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use uuid::Uuid;

use crate::model::{ReplyAddress, ReplyAddressError};

use super::broker::{declare_bound_queue, Broker, BrokerError, DeliveryStream, QueueKind};

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CorrelatorError {
    #[error("invalid reply address: {0}")]
    Address(#[from] ReplyAddressError),
    #[error("reply queue setup failed: {0}")]
    Setup(BrokerError),
    #[error("reply consumer failed: {0}")]
    Receive(BrokerError),
    #[error("reply queue '{queue}' closed before a reply arrived")]
    Closed { queue: String },
    #[error("no reply on '{queue}' after {}s", .after.as_secs())]
    Timeout { queue: String, after: Duration },
}

/// Completion message received on a reply queue. The payload is opaque.
#[derive(Debug, Clone)]
pub struct Reply {
    pub data: Vec<u8>,
    pub routing_key: String,
}

// ── ReplyCorrelator ────────────────────────────────────────────────────────────

/// Turns the broker's publish/subscribe model into a one-shot call/response.
///
/// Every [`open`](Self::open) creates a private queue named by a fresh UUIDv4
/// and binds it to the reply exchange with that name as routing key. Whoever
/// is given the resulting [`ReplyAddress`] can reach exactly that queue and no
/// other.
#[derive(Clone)]
pub struct ReplyCorrelator {
    broker: Arc<dyn Broker>,
    exchange: String,
    timeout: Option<Duration>,
}

impl ReplyCorrelator {
    /// `timeout = None` waits forever for a reply.
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            timeout,
        }
    }

    /// Declare, bind and start consuming a new reply queue.
    ///
    /// The queue exists and is bound before this returns, so the address can
    /// be published immediately without racing the reply.
    pub async fn open(&self) -> Result<PendingReply, CorrelatorError> {
        let queue = Uuid::new_v4().to_string();
        let address = ReplyAddress::new(self.exchange.as_str(), queue.as_str())?;

        let mut pending = PendingReply {
            broker: Arc::clone(&self.broker),
            address,
            timeout: self.timeout,
            stream: None,
            settled: false,
        };

        declare_bound_queue(self.broker.as_ref(), &self.exchange, &queue, QueueKind::Ephemeral)
            .await
            .map_err(CorrelatorError::Setup)?;

        // From here on `pending` owns the queue; dropping it on error deletes it.
        let stream = self
            .broker
            .consume(&queue, &queue)
            .await
            .map_err(CorrelatorError::Setup)?;
        pending.stream = Some(stream);

        tracing::debug!(queue = %queue, exchange = %self.exchange, "reply queue ready");
        Ok(pending)
    }
}

// ── PendingReply ───────────────────────────────────────────────────────────────

/// Exclusive owner of one reply queue.
///
/// The queue is deleted exactly once: by [`receive`](Self::receive),
/// [`abandon`](Self::abandon), or, as a last resort, on drop.
pub struct PendingReply {
    broker: Arc<dyn Broker>,
    address: ReplyAddress,
    timeout: Option<Duration>,
    stream: Option<DeliveryStream>,
    settled: bool,
}

impl PendingReply {
    /// Address to embed in the outgoing request.
    pub fn address(&self) -> &ReplyAddress {
        &self.address
    }

    pub fn queue(&self) -> &str {
        self.address.queue()
    }

    /// Wait for the first message on the queue, acknowledge it, then delete
    /// the queue.
    ///
    /// The queue is deleted whatever the outcome (reply, stream error or
    /// timeout), so later publishes to this address are unroutable.
    pub async fn receive(mut self) -> Result<Reply, CorrelatorError> {
        let outcome = self.next_reply().await;
        self.delete().await;
        outcome
    }

    /// Delete the queue without waiting for a reply.
    pub async fn abandon(mut self) {
        self.delete().await;
    }

    async fn next_reply(&mut self) -> Result<Reply, CorrelatorError> {
        let queue = self.address.queue().to_string();
        let Some(stream) = self.stream.as_mut() else {
            return Err(CorrelatorError::Closed { queue });
        };

        let next = match self.timeout {
            None => stream.next().await,
            Some(after) => tokio::time::timeout(after, stream.next())
                .await
                .map_err(|_| CorrelatorError::Timeout {
                    queue: queue.clone(),
                    after,
                })?,
        };

        let delivery = match next {
            None => return Err(CorrelatorError::Closed { queue }),
            Some(Err(e)) => return Err(CorrelatorError::Receive(e)),
            Some(Ok(delivery)) => delivery,
        };

        if let Err(e) = delivery.ack().await {
            tracing::warn!(queue = %queue, error = %e, "failed to ack reply");
        }

        Ok(Reply {
            data: delivery.data,
            routing_key: delivery.routing_key,
        })
    }

    async fn delete(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        self.stream = None;

        let queue = self.address.queue();
        match self.broker.delete_queue(queue).await {
            Ok(()) => tracing::debug!(queue = %queue, "reply queue deleted"),
            Err(e) => tracing::warn!(queue = %queue, error = %e, "failed to delete reply queue"),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Owner went away without receiving (panic or early return): delete
        // the queue in the background so it does not outlive the job.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(queue = %self.address.queue(), "reply queue leaked: no runtime");
            return;
        };
        let broker = Arc::clone(&self.broker);
        let queue = self.address.queue().to_string();
        runtime.spawn(async move {
            if let Err(e) = broker.delete_queue(&queue).await {
                tracing::warn!(queue = %queue, error = %e, "failed to delete abandoned reply queue");
            }
        });
    }
}
