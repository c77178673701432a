//! Transcode-then-recognize job orchestration over RabbitMQ.
//!
//! The `server` role signs storage URLs and enqueues a Task per request.
//! The `worker` role consumes Tasks, asks an external transcoder for FLAC
//! through the broker, waits for its reply on a private queue, then runs
//! speech recognition and uploads the transcript.

pub mod api;
pub mod app;
pub mod config;
pub mod messaging;
pub mod metrics;
pub mod model;
pub mod recognition;
pub mod shutdown;
pub mod storage;
pub mod submitter;
pub mod worker;
