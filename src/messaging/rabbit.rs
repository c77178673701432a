use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_lapin::Manager;
use futures_util::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
        QueueDeleteOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, ConnectionProperties, ExchangeKind,
};

use super::broker::{Acknowledger, Broker, BrokerError, Delivery, DeliveryStream, QueueKind};

/// Re-exported so other modules inside `messaging/` can import Pool from here.
pub type Pool = deadpool_lapin::Pool;

// ── Connection retry ───────────────────────────────────────────────────────────

const MAX_CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// AMQP `delivery_mode` for persistent messages.
const PERSISTENT: u8 = 2;

// ── Pool constructor ───────────────────────────────────────────────────────────

/// Build a [`deadpool_lapin`] connection pool and verify connectivity with retry logic.
///
/// Attempts up to [`MAX_CONNECT_ATTEMPTS`] (10) times with a
/// [`CONNECT_RETRY_INTERVAL`] (5 s) delay between each attempt, so the worker
/// can start before the broker container is ready.
pub async fn build_pool(url: &str, max_connections: usize) -> Result<Pool, BrokerError> {
    let manager = Manager::new(url, ConnectionProperties::default());

    let pool = Pool::builder(manager)
        .max_size(max_connections)
        .build()
        .map_err(|e| BrokerError::Connection(format!("pool build failed: {e}")))?;

    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match pool.get().await {
            Ok(_) => {
                tracing::info!("📡 RabbitMQ connected");
                return Ok(pool);
            }
            Err(e) if attempt < MAX_CONNECT_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    max = MAX_CONNECT_ATTEMPTS,
                    error = %e,
                    "⚠️  RabbitMQ not ready, retrying in {}s...",
                    CONNECT_RETRY_INTERVAL.as_secs()
                );
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(BrokerError::Connection(format!(
                    "failed after {MAX_CONNECT_ATTEMPTS} attempts: {e}"
                )));
            }
        }
    }

    unreachable!()
}

// ── RabbitBroker ───────────────────────────────────────────────────────────────

/// [`Broker`] backed by one lapin [`Channel`].
///
/// Cloning is cheap (the channel is Arc-backed) and lapin serialises frames on
/// the channel internally, so one instance can be shared by every in-flight job.
#[derive(Clone)]
pub struct RabbitBroker {
    /// AMQP channel. Also keeps the parent connection alive.
    channel: Channel,
}

impl RabbitBroker {
    /// Take a connection from `pool` and open a dedicated channel on it.
    ///
    /// `prefetch_count` bounds how many unacked deliveries the broker pushes to
    /// consumers on this channel.
    pub async fn open(pool: &Pool, prefetch_count: u16) -> Result<Self, BrokerError> {
        let conn = pool
            .get()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;

        // conn (pool Object) drops here; the channel's Arc<Connection> keeps the
        // underlying TCP connection alive.

        channel
            .basic_qos(prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(|e| BrokerError::Channel(format!("QoS setup failed: {e}")))?;

        Ok(Self { channel })
    }
}

#[async_trait]
impl Broker for RabbitBroker {
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Topology(format!("exchange '{name}': {e}")))
    }

    async fn declare_queue(&self, name: &str, kind: QueueKind) -> Result<(), BrokerError> {
        let options = match kind {
            QueueKind::Durable => QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            QueueKind::Ephemeral => QueueDeclareOptions {
                durable: false,
                auto_delete: true,
                ..Default::default()
            },
        };

        self.channel
            .queue_declare(name, options, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Topology(format!("queue '{name}': {e}")))
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                BrokerError::Topology(format!(
                    "bind '{queue}' → '{exchange}' via '{routing_key}': {e}"
                ))
            })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        let props = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT);

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                props,
            )
            .await
            .map_err(|e| BrokerError::Publish(format!("'{exchange}' via '{routing_key}': {e}")))?;

        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(format!("queue '{queue}': {e}")))?;

        let stream = consumer.map(|result| {
            result
                .map(|delivery| {
                    let acker: Arc<dyn Acknowledger> = Arc::new(RabbitAcker(delivery.acker));
                    Delivery::new(
                        delivery.data,
                        delivery.routing_key.as_str(),
                        delivery.redelivered,
                        acker,
                    )
                })
                .map_err(|e| BrokerError::Consume(e.to_string()))
        });

        Ok(stream.boxed())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_delete(name, QueueDeleteOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Delete(format!("queue '{name}': {e}")))
    }
}

struct RabbitAcker(Acker);

#[async_trait]
impl Acknowledger for RabbitAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.0
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}
