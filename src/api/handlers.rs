use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::model::SubmitRequest;
use crate::submitter::{JobSubmitter, SubmitError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub async fn health_handler() -> &'static str {
    "ok"
}

pub async fn submit_handler(
    State(submitter): State<JobSubmitter>,
    Json(body): Json<SubmitRequest>,
) -> Response {
    tracing::info!(
        source = %body.source_file_url,
        lang = %body.lang_code,
        "speech to text request received"
    );

    match submitter.submit(body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            let status = match e {
                SubmitError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                SubmitError::Sign(_) | SubmitError::Publish(_) => StatusCode::BAD_GATEWAY,
            };
            tracing::warn!(error = %e, status = status.as_u16(), "submission failed");
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
