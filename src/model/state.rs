use std::fmt;

/// Lifecycle of one Task inside the worker.
///
/// ```text
/// Received ─► TranscodeDispatched ─► AwaitingTranscodeReply ─► Recognizing ─► Completed
///     └──────────────┴───────────────────────┴──────────────────────┴────────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    TranscodeDispatched,
    AwaitingTranscodeReply,
    Recognizing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::TranscodeDispatched => "transcode_dispatched",
            Self::AwaitingTranscodeReply => "awaiting_transcode_reply",
            Self::Recognizing => "recognizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
