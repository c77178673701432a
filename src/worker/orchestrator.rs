use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::messaging::Job;
use crate::model::JobState;
use crate::shutdown::ShutdownSignal;

use super::pipeline::Pipeline;
use super::task;

/// Drives the transcode-then-recognize pipeline for every Task on the
/// primary queue.
///
/// # Architecture
///
/// ```text
/// jobs_rx (mpsc from TaskConsumer)
///     │
///     │  consume loop — one Task at a time
///     ▼
/// task::dispatch  (open reply queue, publish transcode request, ack)
///     │
///     │  JoinSet::spawn — one task per job
///     ▼
/// task::complete  (await reply ─► recognize ─► upload)
/// ```
///
/// Dispatch is serial; everything after it runs concurrently, so many jobs
/// can wait on their transcoder replies at once. Jobs share nothing mutable:
/// each owns its Task, its reply queue and its delivery.
///
/// # Shutdown
/// On shutdown (or when `jobs_rx` closes) the loop stops taking Tasks and
/// gives in-flight jobs `shutdown_grace` to finish. Jobs still running after
/// that are aborted; their reply queues are deleted as they drop.
pub struct Orchestrator {
    pipeline: Pipeline,
    shutdown_grace: Duration,
}

impl Orchestrator {
    pub fn new(pipeline: Pipeline, shutdown_grace: Duration) -> Self {
        Self {
            pipeline,
            shutdown_grace,
        }
    }

    /// Process Tasks until shutdown, then drain in-flight jobs.
    pub async fn run(self, mut jobs_rx: mpsc::Receiver<Job>, mut shutdown_signal: ShutdownSignal) {
        let mut in_flight: JoinSet<JobState> = JoinSet::new();

        tracing::info!(ack_policy = %self.pipeline.ack_policy, "👷 orchestrator ready");

        // `biased` keeps the shutdown branch first so a busy queue cannot
        // starve it; reaping comes next so the JoinSet stays small.
        loop {
            tokio::select! {
                biased;

                _ = shutdown_signal.wait() => {
                    tracing::info!("🛑 shutdown signal received, no longer taking tasks");
                    break;
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(joined);
                }

                job = jobs_rx.recv() => {
                    let Some(job) = job else {
                        tracing::info!("job channel closed");
                        break;
                    };
                    self.pipeline.metrics.inc_received();

                    if let Some(dispatched) = task::dispatch(&self.pipeline, job).await {
                        tracing::debug!(job = %dispatched.job_id(), "handing off to background task");
                        in_flight.spawn(task::complete(self.pipeline.clone(), dispatched));
                    }
                }
            }
        }

        // Stop the consumer so no further Tasks are prefetched into the channel.
        drop(jobs_rx);

        self.drain(&mut in_flight).await;
    }

    async fn drain(&self, in_flight: &mut JoinSet<JobState>) {
        if in_flight.is_empty() {
            return;
        }

        tracing::info!(
            jobs = in_flight.len(),
            grace_secs = self.shutdown_grace.as_secs(),
            "🛑 draining in-flight jobs..."
        );

        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while let Some(joined) = in_flight.join_next().await {
                log_join(joined);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                jobs = in_flight.len(),
                "⚠️  grace period elapsed, abandoning in-flight jobs"
            );
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }

        tracing::info!("all jobs settled");
    }
}

fn log_join(joined: Result<JobState, tokio::task::JoinError>) {
    match joined {
        Ok(state) => tracing::debug!(state = %state, "job finished"),
        Err(e) if e.is_cancelled() => tracing::debug!("job aborted"),
        Err(e) => tracing::error!(error = %e, "job task panicked"),
    }
}
