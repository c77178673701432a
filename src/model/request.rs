use serde::{Deserialize, Serialize};

/// Inbound job submission accepted by the HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitRequest {
    /// Where the transcoder fetches the original audio from.
    pub source_file_url: String,

    /// BCP-47 language tag, e.g. `en-US`.
    pub lang_code: String,
}

/// Returned to the submitter once the Task is on the primary queue.
///
/// `result_file_url` is a pre-signed GET URL. It answers 404 until the worker
/// has uploaded the transcript.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SubmitResponse {
    pub result_file_url: String,
}
