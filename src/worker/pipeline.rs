use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::messaging::{ReplyCorrelator, TranscodeProducer};
use crate::metrics::Metrics;
use crate::recognition::RecognitionStage;

/// When the primary Task delivery is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Ack as soon as the transcode request is published.
    ///
    /// A crash or failure after dispatch loses the job: the broker will not
    /// redeliver it.
    #[default]
    OnDispatch,
    /// Ack only after the transcript is uploaded. Failures reject the
    /// delivery, requeueing it once.
    OnCompletion,
}

impl AckPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDispatch => "dispatch",
            Self::OnCompletion => "completion",
        }
    }
}

impl fmt::Display for AckPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dispatch" => Ok(Self::OnDispatch),
            "completion" => Ok(Self::OnCompletion),
            other => Err(format!("unknown ack policy '{other}'")),
        }
    }
}

/// Everything one job needs, shared by every in-flight job.
///
/// Cloning is cheap: all members are Arc-backed.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) correlator: ReplyCorrelator,
    pub(crate) transcoder: TranscodeProducer,
    pub(crate) recognition: RecognitionStage,
    pub(crate) ack_policy: AckPolicy,
    pub(crate) metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(
        correlator: ReplyCorrelator,
        transcoder: TranscodeProducer,
        recognition: RecognitionStage,
        ack_policy: AckPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            correlator,
            transcoder,
            recognition,
            ack_policy,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
