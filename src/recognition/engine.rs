use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("recognition request failed: {0}")]
    Request(String),
    #[error("recognition API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected recognition response: {0}")]
    Response(String),
}

/// Audio encoding the engine is told to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Flac,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flac => "FLAC",
        }
    }
}

/// Fixed decoding parameters for every recognition call.
///
/// The transcoder always produces 16 kHz FLAC, so these never vary per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub sample_rate_hertz: u32,
    pub encoding: AudioEncoding,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hertz: 16_000,
            encoding: AudioEncoding::Flac,
        }
    }
}

/// One recognized segment with its alternative transcripts, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechResult {
    pub alternatives: Vec<String>,
}

/// External speech recognition API.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn recognize(
        &self,
        audio: &[u8],
        config: RecognitionConfig,
        lang_code: &str,
    ) -> Result<Vec<SpeechResult>, EngineError>;
}
