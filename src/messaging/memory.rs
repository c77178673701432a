//! In-process [`Broker`] with RabbitMQ direct-exchange semantics.
//!
//! Used by the test-suite and for running the pipeline without a broker.
//! Routing, manual acknowledgement, requeue and queue deletion behave like
//! their AMQP counterparts; persistence and multiple consumers per queue are
//! not modelled.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;

use super::broker::{Acknowledger, Broker, BrokerError, Delivery, DeliveryStream, QueueKind};

/// Counters for one queue, as observed by [`InMemoryBroker::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Waiting for a consumer.
    pub ready: usize,
    /// Handed to a consumer, not yet settled.
    pub unacked: usize,
    /// Total deliveries, redeliveries included.
    pub delivered: usize,
    pub acked: usize,
    pub rejected: usize,
}

#[derive(Clone)]
struct Message {
    data: Vec<u8>,
    routing_key: String,
    redelivered: bool,
}

struct QueueState {
    kind: QueueKind,
    ready: VecDeque<Message>,
    unacked: HashMap<u64, Message>,
    consumer: Option<mpsc::UnboundedSender<Delivery>>,
    stats: QueueStats,
}

impl QueueState {
    fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            consumer: None,
            stats: QueueStats::default(),
        }
    }
}

#[derive(Default)]
struct State {
    exchanges: HashSet<String>,
    /// exchange → (routing key, queue)
    bindings: HashMap<String, Vec<(String, String)>>,
    queues: HashMap<String, QueueState>,
    failing_exchanges: HashSet<String>,
    unroutable: usize,
    next_tag: u64,
}

/// Cheap to clone; every clone shares the same routing table.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.lock().queues.contains_key(name)
    }

    /// Kind of `name`, or `None` if it does not exist.
    pub fn queue_kind(&self, name: &str) -> Option<QueueKind> {
        self.lock().queues.get(name).map(|q| q.kind)
    }

    pub fn stats(&self, queue: &str) -> Option<QueueStats> {
        self.lock().queues.get(queue).map(|q| QueueStats {
            ready: q.ready.len(),
            unacked: q.unacked.len(),
            ..q.stats
        })
    }

    /// Messages published so far that matched no binding and were dropped.
    pub fn unroutable(&self) -> usize {
        self.lock().unroutable
    }

    /// Make every subsequent publish to `exchange` fail.
    pub fn fail_publishes_to(&self, exchange: &str) {
        self.lock().failing_exchanges.insert(exchange.to_string());
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Push ready messages to the queue's consumer, if any.
fn dispatch(state: &Arc<Mutex<State>>, guard: &mut State, queue: &str) {
    let Some(q) = guard.queues.get_mut(queue) else {
        return;
    };
    let Some(consumer) = q.consumer.clone() else {
        return;
    };

    while let Some(message) = q.ready.pop_front() {
        guard.next_tag += 1;
        let tag = guard.next_tag;

        let acker: Arc<dyn Acknowledger> = Arc::new(MemoryAcker {
            state: Arc::downgrade(state),
            queue: queue.to_string(),
            tag,
        });
        let delivery = Delivery::new(
            message.data.clone(),
            message.routing_key.clone(),
            message.redelivered,
            acker,
        );

        if consumer.send(delivery).is_err() {
            // Consumer stream dropped: keep the message for the next consumer.
            q.ready.push_front(message);
            q.consumer = None;
            return;
        }

        q.unacked.insert(tag, message);
        q.stats.delivered += 1;
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.lock().exchanges.insert(name.to_string());
        Ok(())
    }

    async fn declare_queue(&self, name: &str, kind: QueueKind) -> Result<(), BrokerError> {
        self.lock()
            .queues
            .entry(name.to_string())
            .or_insert_with(|| QueueState::new(kind));
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let mut guard = self.lock();
        if !guard.exchanges.contains(exchange) {
            return Err(BrokerError::Topology(format!("no exchange '{exchange}'")));
        }
        if !guard.queues.contains_key(queue) {
            return Err(BrokerError::Topology(format!("no queue '{queue}'")));
        }

        let bindings = guard.bindings.entry(exchange.to_string()).or_default();
        let binding = (routing_key.to_string(), queue.to_string());
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        let mut guard = self.lock();
        if guard.failing_exchanges.contains(exchange) {
            return Err(BrokerError::Publish(format!("'{exchange}': injected failure")));
        }
        if !guard.exchanges.contains(exchange) {
            return Err(BrokerError::Publish(format!("no exchange '{exchange}'")));
        }

        let targets: Vec<String> = guard
            .bindings
            .get(exchange)
            .map(|bindings| {
                bindings
                    .iter()
                    .filter(|(key, _)| key == routing_key)
                    .map(|(_, queue)| queue.clone())
                    .collect()
            })
            .unwrap_or_default();

        if targets.is_empty() {
            guard.unroutable += 1;
            return Ok(());
        }

        for queue in targets {
            if let Some(q) = guard.queues.get_mut(&queue) {
                q.ready.push_back(Message {
                    data: body.to_vec(),
                    routing_key: routing_key.to_string(),
                    redelivered: false,
                });
            }
            dispatch(&self.state, &mut guard, &queue);
        }
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        _consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut guard = self.lock();
            let q = guard
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::Consume(format!("no queue '{queue}'")))?;
            if q.consumer.as_ref().is_some_and(|c| !c.is_closed()) {
                return Err(BrokerError::Consume(format!(
                    "queue '{queue}' already has a consumer"
                )));
            }
            q.consumer = Some(tx);
            dispatch(&self.state, &mut guard, queue);
        }

        let deliveries = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (Ok(delivery), rx))
        });
        Ok(deliveries.boxed())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        let mut guard = self.lock();
        // Dropping the queue state drops its consumer sender, ending the stream.
        guard.queues.remove(name);
        for bindings in guard.bindings.values_mut() {
            bindings.retain(|(_, queue)| queue != name);
        }
        Ok(())
    }
}

struct MemoryAcker {
    state: Weak<Mutex<State>>,
    queue: String,
    tag: u64,
}

impl MemoryAcker {
    fn settle(&self, requeue: Option<bool>) -> Result<(), BrokerError> {
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| BrokerError::Ack("broker dropped".to_string()))?;
        let mut guard = lock_state(&state);

        let q = guard
            .queues
            .get_mut(&self.queue)
            .ok_or_else(|| BrokerError::Ack(format!("queue '{}' deleted", self.queue)))?;
        let message = q
            .unacked
            .remove(&self.tag)
            .ok_or_else(|| BrokerError::Ack(format!("unknown delivery tag {}", self.tag)))?;

        match requeue {
            None => q.stats.acked += 1,
            Some(requeue) => {
                q.stats.rejected += 1;
                if requeue {
                    q.ready.push_front(Message {
                        redelivered: true,
                        ..message
                    });
                    dispatch(&state, &mut guard, &self.queue);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle(None)
    }

    async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.settle(Some(requeue))
    }
}
