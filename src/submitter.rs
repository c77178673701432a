use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::messaging::{ProducerError, TaskProducer};
use crate::model::{SubmitRequest, SubmitResponse, Task};
use crate::storage::{SignError, SignedMethod, UrlSigner};

/// Prefix for transcoded audio objects.
const AUDIO_PREFIX: &str = "media/audio";
/// Prefix for transcript objects.
const RESULT_PREFIX: &str = "media/results";

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error("failed to enqueue task: {0}")]
    Publish(#[from] ProducerError),
}

// ── JobSubmitter ───────────────────────────────────────────────────────────────

/// Turns an inbound request into a self-contained Task on the primary queue.
///
/// The caller gets the result URL back immediately; it stays 404 until the
/// worker uploads the transcript. Nothing is queued unless every URL was
/// signed, so a failed submission leaves no state behind.
#[derive(Clone)]
pub struct JobSubmitter {
    signer: Arc<dyn UrlSigner>,
    producer: TaskProducer,
    url_ttl: Duration,
}

impl JobSubmitter {
    pub fn new(signer: Arc<dyn UrlSigner>, producer: TaskProducer, url_ttl: Duration) -> Self {
        Self {
            signer,
            producer,
            url_ttl,
        }
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse, SubmitError> {
        let SubmitRequest {
            source_file_url,
            lang_code,
        } = request;

        if source_file_url.trim().is_empty() {
            return Err(SubmitError::InvalidRequest("source_file_url must not be empty"));
        }
        if lang_code.trim().is_empty() {
            return Err(SubmitError::InvalidRequest("lang_code must not be empty"));
        }

        let audio_object = format!("{AUDIO_PREFIX}/{}.flac", Uuid::new_v4());
        let result_object = format!("{RESULT_PREFIX}/{}.json", Uuid::new_v4());

        let upload_audio_file_url = self.sign(&audio_object, SignedMethod::Put).await?;
        let download_audio_file_url = self.sign(&audio_object, SignedMethod::Get).await?;
        let upload_result_file_url = self.sign(&result_object, SignedMethod::Put).await?;
        let result_file_url = self.sign(&result_object, SignedMethod::Get).await?;

        let task = Task {
            source_file_url,
            lang_code,
            upload_audio_file_url,
            download_audio_file_url,
            upload_result_file_url,
        };
        self.producer.publish(&task).await?;

        tracing::info!(
            source = %task.source_file_url,
            lang = %task.lang_code,
            result_object = %result_object,
            "📨 task enqueued"
        );

        Ok(SubmitResponse { result_file_url })
    }

    async fn sign(&self, object: &str, method: SignedMethod) -> Result<String, SignError> {
        self.signer.sign(object, method, self.url_ttl).await
    }
}
