use serde::{Deserialize, Serialize};

/// One end-to-end recognition job, as published on the primary queue.
///
/// Published to: primary exchange (direct)
/// Routing key:  primary queue name
///
/// Every URL is pre-signed by the submitter, so nothing downstream needs
/// storage credentials or a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Task {
    /// Original audio, read by the transcoder.
    pub source_file_url: String,

    /// BCP-47 language tag passed to the recognition engine.
    pub lang_code: String,

    /// PUT target for the transcoded FLAC.
    pub upload_audio_file_url: String,

    /// GET URL of the same FLAC object, read by the recognition stage.
    pub download_audio_file_url: String,

    /// PUT target for the transcript JSON.
    pub upload_result_file_url: String,
}

impl Task {
    /// Input for the recognition stage once transcoding has finished.
    pub fn recognize_input(&self) -> RecognizeInput {
        RecognizeInput {
            source_file_url: self.download_audio_file_url.clone(),
            destination_file_url: self.upload_result_file_url.clone(),
            lang_code: self.lang_code.clone(),
        }
    }
}

/// What the recognition stage needs: where to read audio, where to write the
/// transcript, and which language to recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizeInput {
    pub source_file_url: String,
    pub destination_file_url: String,
    pub lang_code: String,
}
