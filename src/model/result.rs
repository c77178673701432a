use serde::{Deserialize, Serialize};

/// Durable result artifact uploaded for every completed job.
///
/// `result` is the flattened list of every alternative of every recognized
/// segment, in engine order. It is never sorted or deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub result: Vec<String>,
}

impl TranscriptResult {
    pub fn new(result: Vec<String>) -> Self {
        Self { result }
    }

    /// Serialize to the compact JSON body stored at the result URL.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
