use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::engine::{EngineError, RecognitionConfig, RecognitionEngine, SpeechResult};

pub const DEFAULT_ENDPOINT: &str = "https://speech.googleapis.com";

/// Google Cloud Speech-to-Text v1 `speech:recognize` over REST.
pub struct GoogleSpeechEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleSpeechEngine {
    pub fn new(client: reqwest::Client, endpoint: Option<String>, api_key: String) -> Self {
        let endpoint = endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

// ── Wire types ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    config: WireConfig<'a>,
    audio: WireAudio,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
}

#[derive(Serialize)]
struct WireAudio {
    content: String,
}

#[derive(Deserialize, Default)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<WireResult>,
}

#[derive(Deserialize)]
struct WireResult {
    #[serde(default)]
    alternatives: Vec<WireAlternative>,
}

#[derive(Deserialize)]
struct WireAlternative {
    #[serde(default)]
    transcript: String,
}

#[async_trait]
impl RecognitionEngine for GoogleSpeechEngine {
    async fn recognize(
        &self,
        audio: &[u8],
        config: RecognitionConfig,
        lang_code: &str,
    ) -> Result<Vec<SpeechResult>, EngineError> {
        let url = format!("{}/v1/speech:recognize", self.endpoint);
        let body = RecognizeRequest {
            config: WireConfig {
                encoding: config.encoding.as_str(),
                sample_rate_hertz: config.sample_rate_hertz,
                language_code: lang_code,
            },
            audio: WireAudio {
                content: STANDARD.encode(audio),
            },
        };

        tracing::debug!(lang = lang_code, bytes = audio.len(), "sending audio to speech API");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Response(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SpeechResult {
                alternatives: r.alternatives.into_iter().map(|a| a.transcript).collect(),
            })
            .collect())
    }
}
