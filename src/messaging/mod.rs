mod broker;
mod consumer;
mod correlator;
pub mod memory;
mod producer;
mod rabbit;

pub use broker::{
    declare_bound_queue, Acknowledger, Broker, BrokerError, Delivery, DeliveryStream, QueueKind,
};
pub use consumer::{Job, TaskConsumer, Topology};
pub use correlator::{CorrelatorError, PendingReply, Reply, ReplyCorrelator};
pub use memory::InMemoryBroker;
pub use producer::{ProducerError, TaskProducer, TranscodeProducer};
pub use rabbit::{build_pool, Pool, RabbitBroker};
