#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use speechtotext::messaging::{
    Broker, InMemoryBroker, Job, QueueKind, ReplyCorrelator, TaskConsumer, Topology, TranscodeProducer,
};
use speechtotext::metrics::Metrics;
use speechtotext::model::{Task, TranscodeRequest};
use speechtotext::recognition::{
    EngineError, RecognitionConfig, RecognitionEngine, RecognitionStage, SpeechResult,
};
use speechtotext::shutdown::{self, ShutdownHandle};
use speechtotext::storage::{SignError, SignedMethod, UrlSigner};
use speechtotext::worker::{AckPolicy, Orchestrator, Pipeline};

pub const EXCHANGE: &str = "speech_to_text-exchange";
pub const QUEUE: &str = "speech_to_text_worker";
pub const TRANSCODER_EXCHANGE: &str = "transcoder-exchange";
pub const TRANSCODE_ROUTING_KEY: &str = "flac";
pub const TRANSCODER_QUEUE: &str = "transcoder";

/// Audio object used by tests that seed storage directly.
pub const FLAC_BYTES: &[u8] = b"fLaC\0\0\0\x22fake-stream";

/// What the fake transcoder writes for a given source, unique per job.
pub fn transcoded(source_file_url: &str) -> Vec<u8> {
    format!("fLaC:{source_file_url}").into_bytes()
}

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Storage ────────────────────────────────────────────────────────────────────

/// Object store behind signed URLs: GET returns what was PUT, 404 otherwise.
#[derive(Clone, Default)]
pub struct Storage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    reject_results: Arc<Mutex<Option<(u16, String)>>>,
    redirect_results: Arc<Mutex<Option<String>>>,
}

impl Storage {
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn object_string(&self, path: &str) -> Option<String> {
        self.object(path)
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    pub fn insert(&self, path: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }

    /// Answer every PUT under `media/results/` with `status` and `body`.
    pub fn reject_result_uploads(&self, status: u16, body: &str) {
        *self.reject_results.lock().unwrap() = Some((status, body.to_string()));
    }

    /// Answer every PUT under `media/results/` with `302 Found` to `location`.
    pub fn redirect_result_uploads(&self, location: &str) {
        *self.redirect_results.lock().unwrap() = Some(location.to_string());
    }
}

async fn get_object(State(storage): State<Storage>, Path(path): Path<String>) -> Response {
    match storage.object(&path) {
        Some(bytes) => (StatusCode::OK, bytes).into_response(),
        None => (StatusCode::NOT_FOUND, "NoSuchKey").into_response(),
    }
}

async fn put_object(
    State(storage): State<Storage>,
    Path(path): Path<String>,
    body: Bytes,
) -> Response {
    if path.starts_with("media/results/") {
        if let Some((status, message)) = storage.reject_results.lock().unwrap().clone() {
            let status = StatusCode::from_u16(status).unwrap();
            return (status, message).into_response();
        }
        if let Some(location) = storage.redirect_results.lock().unwrap().clone() {
            return (StatusCode::FOUND, [(header::LOCATION, location)], "moved").into_response();
        }
    }
    storage.insert(&path, &body);
    StatusCode::OK.into_response()
}

/// Start the storage server; returns its base URL.
pub async fn start_storage() -> (String, Storage, oneshot::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let storage = Storage::default();

    let app = Router::new()
        .route("/{*path}", get(get_object).put(put_object))
        .with_state(storage.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .ok();
    });

    (base_url, storage, shutdown_tx)
}

/// Signs by pointing straight at the storage server.
pub struct LocalSigner {
    pub base_url: String,
}

#[async_trait]
impl UrlSigner for LocalSigner {
    async fn sign(
        &self,
        object: &str,
        method: SignedMethod,
        _expires_in: Duration,
    ) -> Result<String, SignError> {
        Ok(format!("{}/{}?method={}", self.base_url, object, method))
    }
}

/// Task whose URLs all point at the storage server under `id`.
pub fn task(storage_url: &str, id: &str, lang_code: &str) -> Task {
    let audio = format!("{storage_url}/media/audio/{id}.flac");
    Task {
        source_file_url: format!("https://origin.example/{id}.wav"),
        lang_code: lang_code.to_string(),
        upload_audio_file_url: audio.clone(),
        download_audio_file_url: audio,
        upload_result_file_url: format!("{storage_url}/media/results/{id}.json"),
    }
}

// ── Recognition engine ─────────────────────────────────────────────────────────

/// Scripted engine. By default answers with one segment `transcript <lang>`.
#[derive(Default)]
pub struct FakeEngine {
    failures_left: AtomicUsize,
    results: Option<Vec<SpeechResult>>,
    calls: Mutex<Vec<(Vec<u8>, String)>>,
}

impl FakeEngine {
    pub fn echo() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the first `times` calls with HTTP 500, then echo.
    pub fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        })
    }

    pub fn returning(results: Vec<SpeechResult>) -> Arc<Self> {
        Arc::new(Self {
            results: Some(results),
            ..Default::default()
        })
    }

    /// `(audio, lang_code)` of every call, in order.
    pub fn calls(&self) -> Vec<(Vec<u8>, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecognitionEngine for FakeEngine {
    async fn recognize(
        &self,
        audio: &[u8],
        _config: RecognitionConfig,
        lang_code: &str,
    ) -> Result<Vec<SpeechResult>, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push((audio.to_vec(), lang_code.to_string()));

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::Status {
                status: 500,
                body: "backend unavailable".into(),
            });
        }

        Ok(self.results.clone().unwrap_or_else(|| {
            vec![SpeechResult {
                alternatives: vec![format!("transcript {lang_code}")],
            }]
        }))
    }
}

// ── Transcoder ─────────────────────────────────────────────────────────────────

/// How the fake transcoder answers.
#[derive(Debug, Clone, Copy)]
pub enum Transcoder {
    /// Collect `batch` requests, then upload and reply to them newest first.
    Reverse { batch: usize },
    /// Record requests and never reply.
    Silent,
}

/// Start a transcoder on its own queue. Every request it sees is forwarded
/// to the returned channel.
pub async fn start_transcoder(
    broker: &InMemoryBroker,
    mode: Transcoder,
) -> mpsc::UnboundedReceiver<TranscodeRequest> {
    broker
        .declare_queue(TRANSCODER_QUEUE, QueueKind::Durable)
        .await
        .unwrap();
    broker
        .bind_queue(TRANSCODER_QUEUE, TRANSCODER_EXCHANGE, TRANSCODE_ROUTING_KEY)
        .await
        .unwrap();
    let mut deliveries = broker.consume(TRANSCODER_QUEUE, "transcoder").await.unwrap();

    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let broker = broker.clone();

    tokio::spawn(async move {
        let http = reqwest::Client::new();
        let mut pending = Vec::new();

        while let Some(Ok(delivery)) = deliveries.next().await {
            let request: TranscodeRequest = serde_json::from_slice(&delivery.data).unwrap();
            delivery.ack().await.unwrap();
            let _ = seen_tx.send(request.clone());

            let Transcoder::Reverse { batch } = mode else {
                continue;
            };
            pending.push(request);
            if pending.len() < batch {
                continue;
            }

            for request in pending.drain(..).rev() {
                http.put(&request.destination_file_url)
                    .body(transcoded(&request.source_file_url))
                    .send()
                    .await
                    .unwrap();
                let address = &request.respond_to;
                broker
                    .publish(address.exchange(), address.queue(), br#"{"status":"ok"}"#)
                    .await
                    .unwrap();
            }
        }
    });

    seen_rx
}

// ── Worker ─────────────────────────────────────────────────────────────────────

pub fn topology() -> Topology {
    Topology {
        exchange: EXCHANGE.into(),
        queue: QUEUE.into(),
        transcoder_exchange: TRANSCODER_EXCHANGE.into(),
        reply_exchange: EXCHANGE.into(),
    }
}

/// Broker with the worker topology already declared.
pub async fn broker() -> InMemoryBroker {
    let broker = InMemoryBroker::new();
    topology().declare(&broker).await.unwrap();
    broker
}

pub struct WorkerOptions {
    pub ack_policy: AckPolicy,
    pub reply_timeout: Option<Duration>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            ack_policy: AckPolicy::OnDispatch,
            reply_timeout: None,
        }
    }
}

/// Pipeline over the in-memory broker, with its metrics.
pub fn pipeline(
    broker: &InMemoryBroker,
    engine: Arc<dyn RecognitionEngine>,
    options: WorkerOptions,
) -> (Pipeline, Arc<Metrics>) {
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    let metrics = Arc::new(Metrics::new());

    let pipeline = Pipeline::new(
        ReplyCorrelator::new(Arc::clone(&shared), EXCHANGE, options.reply_timeout),
        TranscodeProducer::new(shared, TRANSCODER_EXCHANGE, TRANSCODE_ROUTING_KEY),
        RecognitionStage::new(RecognitionStage::default_client().unwrap(), engine),
        options.ack_policy,
        Arc::clone(&metrics),
    );
    (pipeline, metrics)
}

/// Consumer on the primary queue of `broker`.
pub async fn jobs(broker: &InMemoryBroker) -> mpsc::Receiver<Job> {
    TaskConsumer::new(Arc::new(broker.clone()), QUEUE, 4)
        .into_receiver()
        .await
        .unwrap()
}

/// A running orchestrator wired to the in-memory broker.
pub struct Worker {
    pub metrics: Arc<Metrics>,
    shutdown: ShutdownHandle,
    task: JoinHandle<()>,
}

impl Worker {
    pub async fn start(
        broker: &InMemoryBroker,
        engine: Arc<dyn RecognitionEngine>,
        options: WorkerOptions,
    ) -> Self {
        let (pipeline, metrics) = pipeline(broker, engine, options);
        let jobs_rx = jobs(broker).await;
        let (handle, signal) = shutdown::new_pair();
        let task = tokio::spawn(Orchestrator::new(pipeline, Duration::from_secs(1)).run(jobs_rx, signal));

        Self {
            metrics,
            shutdown: handle,
            task,
        }
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(WAIT_LIMIT, self.task)
            .await
            .expect("orchestrator did not stop")
            .unwrap();
    }
}

pub async fn publish_task(broker: &InMemoryBroker, task: &Task) {
    let body = serde_json::to_vec(task).unwrap();
    broker.publish(EXCHANGE, QUEUE, &body).await.unwrap();
}
