use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::create_router;
use crate::config::Config;
use crate::messaging::{
    build_pool, Broker, BrokerError, ReplyCorrelator, RabbitBroker, TaskConsumer, TaskProducer,
    Job, Topology, TranscodeProducer,
};
use crate::metrics::Metrics;
use crate::recognition::{GoogleSpeechEngine, RecognitionStage};
use crate::shutdown;
use crate::storage::{GcsUrlSigner, SignError};
use crate::submitter::JobSubmitter;
use crate::worker::{Orchestrator, Pipeline};

// ── Error ──────────────────────────────────────────────────────────────────────

/// Top-level application error, surfaced only at startup.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("rabbitmq error: {0}")]
    Broker(#[from] BrokerError),
    #[error("storage signer error: {0}")]
    Signer(#[from] SignError),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("orchestrator task error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Channels opened against the broker: one for the primary consumer, one
/// shared by publishers and reply queues.
const POOL_SIZE: usize = 2;

// ── Worker ─────────────────────────────────────────────────────────────────────

/// Pipeline worker lifecycle.
///
/// # Startup sequence
/// 1. Load and validate configuration.
/// 2. Connect to RabbitMQ and declare the topology.
/// 3. Wire correlator → transcode producer → recognition stage.
/// 4. Consume the primary queue until SIGINT / SIGTERM, then drain.
pub async fn run_worker() -> Result<(), AppError> {
    // ── 1. Configuration ──────────────────────────────────────────────────────
    let cfg = Config::load()?;
    cfg.log_summary();
    let api_key = cfg.speech_key()?.to_string();

    // ── 2. RabbitMQ ───────────────────────────────────────────────────────────
    tracing::info!("🔌 connecting to RabbitMQ...");
    let pool = build_pool(&cfg.rabbitmq_url, POOL_SIZE).await?;

    let consumer_broker: Arc<dyn Broker> =
        Arc::new(RabbitBroker::open(&pool, cfg.prefetch_count).await?);
    let broker: Arc<dyn Broker> = Arc::new(RabbitBroker::open(&pool, cfg.prefetch_count).await?);

    let topology = Topology {
        exchange: cfg.exchange_name.clone(),
        queue: cfg.queue_name.clone(),
        transcoder_exchange: cfg.transcoder_exchange_name.clone(),
        reply_exchange: cfg.reply_exchange_name.clone(),
    };
    topology.declare(broker.as_ref()).await?;

    // ── 3. Pipeline ───────────────────────────────────────────────────────────
    let metrics = Arc::new(Metrics::new());
    let http = RecognitionStage::default_client()?;
    let engine = GoogleSpeechEngine::new(http.clone(), Some(cfg.speech_endpoint.clone()), api_key);

    let pipeline = Pipeline::new(
        ReplyCorrelator::new(
            Arc::clone(&broker),
            cfg.reply_exchange_name.clone(),
            cfg.reply_timeout,
        ),
        TranscodeProducer::new(
            Arc::clone(&broker),
            cfg.transcoder_exchange_name.clone(),
            cfg.transcode_routing_key.clone(),
        ),
        RecognitionStage::new(http, Arc::new(engine)),
        cfg.ack_policy,
        Arc::clone(&metrics),
    );

    // ── 4. Run ────────────────────────────────────────────────────────────────
    let jobs_rx = TaskConsumer::new(consumer_broker, cfg.queue_name.clone(), cfg.prefetch_count as usize)
        .into_receiver()
        .await?;

    tracing::info!(queue = %cfg.queue_name, "✅ SpeechToText worker started");

    let outcome = supervise(
        Orchestrator::new(pipeline, cfg.shutdown_grace),
        jobs_rx,
        shutdown::wait_for_os_signal(),
    )
    .await;

    metrics.log_summary();
    if outcome.is_ok() {
        tracing::info!("✅ shutdown complete — goodbye");
    }
    outcome
}

/// Run the orchestrator until `os_signal` resolves, then drain it.
///
/// The orchestrator only stops on its own when the primary consumer is gone
/// (channel or connection closed, queue deleted). That is fatal: the error
/// lets the process exit instead of idling without a consumer.
pub async fn supervise<S>(
    orchestrator: Orchestrator,
    jobs_rx: mpsc::Receiver<Job>,
    os_signal: S,
) -> Result<(), AppError>
where
    S: Future<Output = ()> + Send,
{
    let (shutdown_handle, shutdown_signal) = shutdown::new_pair();
    let mut orchestrator_task = tokio::spawn(orchestrator.run(jobs_rx, shutdown_signal));

    tokio::select! {
        joined = &mut orchestrator_task => {
            joined?;
            tracing::error!("❌ primary consumer stopped without a shutdown signal");
            return Err(AppError::Broker(BrokerError::Consume(
                "primary consumer stopped".to_string(),
            )));
        }
        _ = os_signal => {}
    }

    tracing::info!("🛑 signal received — initiating graceful shutdown...");
    shutdown_handle.trigger();

    orchestrator_task.await?;
    Ok(())
}

// ── Server ─────────────────────────────────────────────────────────────────────

/// Job submission server lifecycle: sign URLs, enqueue Tasks, answer with
/// the result URL.
pub async fn run_server() -> Result<(), AppError> {
    let cfg = Config::load()?;
    cfg.log_summary();

    let signer = GcsUrlSigner::new(&cfg.storage_bucket, cfg.credentials_path()?)?;

    tracing::info!("🔌 connecting to RabbitMQ...");
    let pool = build_pool(&cfg.rabbitmq_url, 1).await?;
    let broker: Arc<dyn Broker> = Arc::new(RabbitBroker::open(&pool, cfg.prefetch_count).await?);

    let producer = TaskProducer::new(broker, cfg.exchange_name.clone(), cfg.queue_name.clone());
    producer.declare().await?;

    let submitter = JobSubmitter::new(Arc::new(signer), producer, cfg.signed_url_ttl);
    let router = create_router(submitter);

    let addr = cfg.api_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "✅ server started");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown::wait_for_os_signal())
        .await?;

    tracing::info!("✅ shutdown complete — goodbye");
    Ok(())
}
