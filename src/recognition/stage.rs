use std::sync::Arc;

use crate::model::{RecognizeInput, TranscriptResult};

use super::engine::{EngineError, RecognitionConfig, RecognitionEngine, SpeechResult};

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("audio download failed: {0}")]
    Download(String),
    #[error("audio download rejected: HTTP {status}, body: {body}")]
    DownloadRejected { status: u16, body: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("result encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("result upload failed: {0}")]
    Upload(String),
    #[error("result upload rejected: HTTP {status}, body: {body}")]
    UploadRejected { status: u16, body: String },
}

// ── RecognitionStage ───────────────────────────────────────────────────────────

/// Second pipeline stage: transcoded audio in, transcript JSON out.
///
/// Download → recognize → flatten → encode → upload. No retries; every
/// failure is returned to the caller as-is.
#[derive(Clone)]
pub struct RecognitionStage {
    http: reqwest::Client,
    engine: Arc<dyn RecognitionEngine>,
    config: RecognitionConfig,
}

impl RecognitionStage {
    /// `http` should not follow redirects: only a 200 counts as success.
    pub fn new(http: reqwest::Client, engine: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            http,
            engine,
            config: RecognitionConfig::default(),
        }
    }

    /// HTTP client that never follows redirects, so a 3xx surfaces as a
    /// rejected transfer.
    pub fn default_client() -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
    }

    pub async fn run(&self, input: &RecognizeInput) -> Result<TranscriptResult, RecognitionError> {
        let audio = self.download(&input.source_file_url).await?;
        tracing::debug!(bytes = audio.len(), "audio downloaded");

        let results = self
            .engine
            .recognize(&audio, self.config, &input.lang_code)
            .await?;

        let transcript = TranscriptResult::new(flatten_alternatives(results));
        let body = transcript.encode()?;
        self.upload(&input.destination_file_url, body).await?;

        tracing::debug!(alternatives = transcript.result.len(), "transcript uploaded");
        Ok(transcript)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RecognitionError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RecognitionError::Download(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::DownloadRejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RecognitionError::Download(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn upload(&self, url: &str, body: Vec<u8>) -> Result<(), RecognitionError> {
        let response = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| RecognitionError::Upload(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response
                .text()
                .await
                .map_err(|e| RecognitionError::Upload(e.to_string()))?;
            return Err(RecognitionError::UploadRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Every alternative of every segment, segment order first.
pub fn flatten_alternatives(results: Vec<SpeechResult>) -> Vec<String> {
    results
        .into_iter()
        .flat_map(|r| r.alternatives)
        .collect()
}
