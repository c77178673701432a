use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::model::Task;

use super::broker::{declare_bound_queue, Broker, BrokerError, Delivery, DeliveryStream, QueueKind};

/// Consumer tag on the primary queue.
const CONSUMER_TAG: &str = "speechtotext-worker";

// ── Public types ───────────────────────────────────────────────────────────────

/// A parsed Task ready for the orchestrator.
///
/// Carries both the deserialized Task and the raw [`Delivery`]; the
/// orchestrator decides when to acknowledge it.
#[derive(Debug)]
pub struct Job {
    pub task: Task,
    pub delivery: Delivery,
}

// ── Topology ───────────────────────────────────────────────────────────────────

/// Names of everything the worker declares at startup.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Primary direct exchange Tasks are published to.
    pub exchange: String,
    /// Durable primary queue, bound with its own name.
    pub queue: String,
    /// Exchange shared with the transcoder for requests.
    pub transcoder_exchange: String,
    /// Exchange reply queues are bound to.
    pub reply_exchange: String,
}

impl Topology {
    /// Declare every exchange plus the primary queue and its binding.
    pub async fn declare(&self, broker: &dyn Broker) -> Result<(), BrokerError> {
        broker.declare_exchange(&self.exchange).await?;
        broker.declare_exchange(&self.transcoder_exchange).await?;
        if self.reply_exchange != self.exchange {
            broker.declare_exchange(&self.reply_exchange).await?;
        }
        declare_bound_queue(broker, &self.exchange, &self.queue, QueueKind::Durable).await
    }
}

// ── TaskConsumer ───────────────────────────────────────────────────────────────

/// Consumer on the primary queue.
///
/// Call [`into_receiver`](Self::into_receiver) to start consuming and obtain
/// the job channel read by the orchestrator.
pub struct TaskConsumer {
    broker: Arc<dyn Broker>,
    queue: String,
    capacity: usize,
}

impl TaskConsumer {
    /// `capacity` bounds how many parsed jobs may wait for the orchestrator.
    pub fn new(broker: Arc<dyn Broker>, queue: impl Into<String>, capacity: usize) -> Self {
        Self {
            broker,
            queue: queue.into(),
            capacity: capacity.max(1),
        }
    }

    /// Start consuming and return the receiver end of the job channel.
    ///
    /// Spawns a background task that parses every delivery into a [`Job`].
    /// A body that is not a valid Task is logged and acknowledged: it is
    /// consumed, never requeued.
    pub async fn into_receiver(self) -> Result<mpsc::Receiver<Job>, BrokerError> {
        let (tx, rx) = mpsc::channel::<Job>(self.capacity);

        let deliveries = self.broker.consume(&self.queue, CONSUMER_TAG).await?;
        tokio::spawn(consume_loop(deliveries, tx));

        tracing::info!(queue = %self.queue, "▶️  consuming");
        Ok(rx)
    }
}

// ── Background task ────────────────────────────────────────────────────────────

/// Maps raw deliveries into [`Job`] items until the stream or the receiver
/// closes.
async fn consume_loop(mut deliveries: DeliveryStream, tx: mpsc::Sender<Job>) {
    while let Some(result) = deliveries.next().await {
        let delivery = match result {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, "consumer stream error");
                break;
            }
        };

        tracing::info!(
            routing_key = %delivery.routing_key,
            redelivered = delivery.redelivered,
            "📥 task received"
        );

        let task = match serde_json::from_slice::<Task>(&delivery.data) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(error = %e, "⚠️  malformed task — acknowledging and dropping");
                if let Err(e) = delivery.ack().await {
                    tracing::warn!(error = %e, "failed to ack malformed task");
                }
                continue;
            }
        };

        if tx.send(Job { task, delivery }).await.is_err() {
            // The receiver was dropped: the orchestrator is shutting down.
            break;
        }
    }
    tracing::debug!("task consumer stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::messaging::memory::InMemoryBroker;

    fn topology() -> Topology {
        Topology {
            exchange: "stt".into(),
            queue: "stt-worker".into(),
            transcoder_exchange: "transcoder".into(),
            reply_exchange: "stt".into(),
        }
    }

    #[tokio::test]
    async fn malformed_task_is_acked_and_skipped() {
        let broker = InMemoryBroker::new();
        let topo = topology();
        topo.declare(&broker).await.unwrap();

        broker.publish("stt", "stt-worker", b"not json").await.unwrap();
        let task = Task {
            source_file_url: "https://x/a.wav".into(),
            lang_code: "en-US".into(),
            upload_audio_file_url: "pa".into(),
            download_audio_file_url: "ga".into(),
            upload_result_file_url: "pr".into(),
        };
        broker
            .publish("stt", "stt-worker", &serde_json::to_vec(&task).unwrap())
            .await
            .unwrap();

        let consumer = TaskConsumer::new(Arc::new(broker.clone()), "stt-worker", 4);
        let mut rx = consumer.into_receiver().await.unwrap();

        let job = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.task, task);

        let stats = broker.stats("stt-worker").unwrap();
        assert_eq!(stats.acked, 1, "malformed message acked");
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.unacked, 1, "valid task awaits the orchestrator");
    }

    #[tokio::test]
    async fn topology_declares_durable_primary_queue() {
        let broker = InMemoryBroker::new();
        topology().declare(&broker).await.unwrap();
        assert_eq!(broker.queue_kind("stt-worker"), Some(QueueKind::Durable));
    }
}
