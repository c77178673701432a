use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as StorePath;
use object_store::signer::Signer;
use reqwest::Method;

use super::signer::{SignError, SignedMethod, UrlSigner};

/// V4 signed URLs for a Google Cloud Storage bucket, signed locally with the
/// service-account key.
pub struct GcsUrlSigner {
    inner: Arc<GoogleCloudStorage>,
}

impl GcsUrlSigner {
    /// `credentials` is the path to a service-account JSON key file.
    pub fn new(bucket: &str, credentials: &Path) -> Result<Self, SignError> {
        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket)
            .with_service_account_path(credentials.to_string_lossy())
            .build()
            .map_err(|e| SignError::Setup(e.to_string()))?;

        tracing::debug!(bucket, "GCS signer ready");

        Ok(Self {
            inner: Arc::new(store),
        })
    }
}

#[async_trait]
impl UrlSigner for GcsUrlSigner {
    async fn sign(
        &self,
        object: &str,
        method: SignedMethod,
        expires_in: Duration,
    ) -> Result<String, SignError> {
        let http_method = match method {
            SignedMethod::Get => Method::GET,
            SignedMethod::Put => Method::PUT,
        };

        let url = self
            .inner
            .signed_url(http_method, &StorePath::from(object), expires_in)
            .await
            .map_err(|e| SignError::Sign {
                object: object.to_string(),
                method,
                message: e.to_string(),
            })?;

        Ok(url.to_string())
    }
}
