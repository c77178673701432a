mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use tower::ServiceExt;

use speechtotext::api::create_router;
use speechtotext::messaging::{Broker, InMemoryBroker, TaskProducer};
use speechtotext::model::{SubmitResponse, Task};
use speechtotext::storage::{SignError, SignedMethod, UrlSigner};
use speechtotext::submitter::JobSubmitter;

use helpers::{broker, LocalSigner, EXCHANGE, QUEUE};

const TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct BrokenSigner;

#[async_trait]
impl UrlSigner for BrokenSigner {
    async fn sign(
        &self,
        object: &str,
        method: SignedMethod,
        _expires_in: Duration,
    ) -> Result<String, SignError> {
        Err(SignError::Sign {
            object: object.to_string(),
            method,
            message: "invalid private key".into(),
        })
    }
}

fn create_test_app(broker: &InMemoryBroker, signer: Arc<dyn UrlSigner>) -> Router {
    let producer = TaskProducer::new(Arc::new(broker.clone()) as Arc<dyn Broker>, EXCHANGE, QUEUE);
    create_router(JobSubmitter::new(signer, producer, TTL))
}

fn local_signer() -> Arc<dyn UrlSigner> {
    Arc::new(LocalSigner {
        base_url: "https://storage.example".into(),
    })
}

fn submit_request(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/speech-to-text")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn given_running_server_when_health_check_then_returns_ok() {
    let broker = broker().await;
    let app = create_test_app(&broker, local_signer());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn given_valid_request_when_submitting_then_returns_result_url_and_enqueues_task() {
    let broker = broker().await;
    let app = create_test_app(&broker, local_signer());

    let response = app
        .oneshot(submit_request(
            r#"{"source_file_url": "https://x/a.wav", "lang_code": "en-US"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let submitted: SubmitResponse = serde_json::from_slice(&body).unwrap();
    assert!(submitted
        .result_file_url
        .starts_with("https://storage.example/media/results/"));
    assert!(submitted.result_file_url.ends_with(".json?method=GET"));

    let mut deliveries = broker.consume(QUEUE, "test").await.unwrap();
    let delivery = tokio::time::timeout(Duration::from_secs(1), deliveries.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let task: Task = serde_json::from_slice(&delivery.data).unwrap();
    assert_eq!(task.source_file_url, "https://x/a.wav");
    assert_eq!(task.lang_code, "en-US");
    assert_eq!(
        task.upload_result_file_url.replace("method=PUT", "method=GET"),
        submitted.result_file_url
    );
}

#[tokio::test]
async fn given_empty_language_when_submitting_then_returns_bad_request() {
    let broker = broker().await;
    let app = create_test_app(&broker, local_signer());

    let response = app
        .oneshot(submit_request(
            r#"{"source_file_url": "https://x/a.wav", "lang_code": ""}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(broker.stats(QUEUE).unwrap().ready, 0);
}

#[tokio::test]
async fn given_signer_failure_when_submitting_then_returns_bad_gateway_with_reason() {
    let broker = broker().await;
    let app = create_test_app(&broker, Arc::new(BrokenSigner));

    let response = app
        .oneshot(submit_request(
            r#"{"source_file_url": "https://x/a.wav", "lang_code": "en-US"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("invalid private key"));
    assert_eq!(broker.stats(QUEUE).unwrap().ready, 0);
}
