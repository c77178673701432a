use crate::messaging::{Delivery, Job, PendingReply};
use crate::metrics::Metrics;
use crate::model::{JobState, Task, TranscodeRequest};

use super::pipeline::{AckPolicy, Pipeline};

/// A Task whose transcode request is on its way to the transcoder.
///
/// Owns the reply queue and, under [`AckPolicy::OnCompletion`], the still
/// unacknowledged primary delivery.
pub struct Dispatched {
    task: Task,
    pending: PendingReply,
    delivery: Option<Delivery>,
}

impl Dispatched {
    /// Identifier used in log lines: the reply queue name, unique per job.
    pub fn job_id(&self) -> &str {
        self.pending.queue()
    }
}

// ── Stage 1: dispatch ──────────────────────────────────────────────────────────

/// `Received → TranscodeDispatched`.
///
/// Runs inline in the consume loop. Opens a reply queue, publishes the
/// transcode request carrying its address, then settles the primary delivery
/// according to the ack policy.
///
/// Returns `None` when the job has failed; the delivery is settled and the
/// reply queue deleted in that case. Dispatch failures are terminal: the
/// Task is never requeued under [`AckPolicy::OnDispatch`].
pub async fn dispatch(pipeline: &Pipeline, job: Job) -> Option<Dispatched> {
    let Job { task, delivery } = job;
    tracing::debug!(source = %task.source_file_url, state = %JobState::Received, "job received");

    let pending = match pipeline.correlator.open().await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, state = %JobState::Failed, "❌ could not open reply queue");
            fail_delivery(pipeline, Some(delivery)).await;
            return None;
        }
    };
    let job_id = pending.queue().to_string();

    let request = TranscodeRequest {
        source_file_url: task.source_file_url.clone(),
        destination_file_url: task.upload_audio_file_url.clone(),
        respond_to: pending.address().clone(),
    };

    if let Err(e) = pipeline.transcoder.publish(&request).await {
        tracing::error!(
            job = %job_id,
            error = %e,
            state = %JobState::Failed,
            "❌ transcode dispatch failed"
        );
        pending.abandon().await;
        fail_delivery(pipeline, Some(delivery)).await;
        return None;
    }

    tracing::info!(
        job = %job_id,
        source = %task.source_file_url,
        lang = %task.lang_code,
        exchange = %pipeline.transcoder.exchange(),
        state = %JobState::TranscodeDispatched,
        "🎛️  transcode dispatched"
    );
    pipeline.metrics.inc_dispatched();

    let delivery = match pipeline.ack_policy {
        AckPolicy::OnDispatch => {
            ack(&job_id, &delivery).await;
            None
        }
        AckPolicy::OnCompletion => Some(delivery),
    };

    Some(Dispatched {
        task,
        pending,
        delivery,
    })
}

// ── Stage 2: await reply, recognize ────────────────────────────────────────────

/// `TranscodeDispatched → AwaitingTranscodeReply → Recognizing → Completed | Failed`.
///
/// Meant to run as its own task so the consume loop can move on.
pub async fn complete(pipeline: Pipeline, dispatched: Dispatched) -> JobState {
    let Dispatched {
        task,
        pending,
        delivery,
    } = dispatched;
    let job_id = pending.queue().to_string();

    let _in_flight = InFlight::enter(&pipeline.metrics);
    tracing::debug!(job = %job_id, state = %JobState::AwaitingTranscodeReply, "waiting for transcoder");

    let state = match pending.receive().await {
        Err(e) => {
            tracing::error!(job = %job_id, error = %e, state = %JobState::Failed, "❌ no transcode reply");
            JobState::Failed
        }
        Ok(reply) => {
            tracing::debug!(
                job = %job_id,
                payload = %String::from_utf8_lossy(&reply.data),
                state = %JobState::Recognizing,
                "transcode reply received"
            );

            let input = task.recognize_input();
            match pipeline.recognition.run(&input).await {
                Ok(transcript) => {
                    tracing::info!(
                        job = %job_id,
                        lang = %input.lang_code,
                        alternatives = transcript.result.len(),
                        state = %JobState::Completed,
                        "✅ recognizing completed"
                    );
                    JobState::Completed
                }
                Err(e) => {
                    tracing::error!(
                        job = %job_id,
                        error = %e,
                        state = %JobState::Failed,
                        "❌ recognition failed"
                    );
                    JobState::Failed
                }
            }
        }
    };

    match state {
        JobState::Completed => {
            pipeline.metrics.inc_completed();
            if let Some(delivery) = &delivery {
                ack(&job_id, delivery).await;
            }
        }
        _ => fail_delivery(&pipeline, delivery).await,
    }

    state
}

// ── Private helpers ────────────────────────────────────────────────────────────

/// Holds one unit of the in-flight gauge; released on drop, so jobs aborted
/// during shutdown are uncounted too.
struct InFlight<'a>(&'a Metrics);

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.inc_in_flight();
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.dec_in_flight();
    }
}

async fn ack(job_id: &str, delivery: &Delivery) {
    if let Err(e) = delivery.ack().await {
        tracing::warn!(job = %job_id, error = %e, "failed to ack task");
    }
}

/// Count a failed job and settle its delivery, if still held.
///
/// Under [`AckPolicy::OnDispatch`] the Task is consumed; under
/// [`AckPolicy::OnCompletion`] it is requeued unless this was already a
/// redelivery.
async fn fail_delivery(pipeline: &Pipeline, delivery: Option<Delivery>) {
    pipeline.metrics.inc_failed();

    let Some(delivery) = delivery else {
        return;
    };

    let result = match pipeline.ack_policy {
        AckPolicy::OnDispatch => delivery.ack().await,
        AckPolicy::OnCompletion => {
            let requeue = !delivery.redelivered;
            tracing::info!(requeue, "↩️  rejecting task");
            delivery.reject(requeue).await
        }
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to settle failed task");
    }
}
