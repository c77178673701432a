use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::submitter::JobSubmitter;

use super::handlers::{health_handler, submit_handler};

pub fn create_router(submitter: JobSubmitter) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/speech-to-text", post(submit_handler))
        .layer(trace_layer)
        .with_state(submitter)
}
