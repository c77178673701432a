use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("storage client setup failed: {0}")]
    Setup(String),
    #[error("signing '{object}' for {method} failed: {message}")]
    Sign {
        object: String,
        method: SignedMethod,
        message: String,
    },
}

/// HTTP method a signed URL is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignedMethod {
    Get,
    Put,
}

impl SignedMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for SignedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues time-limited URLs for objects in one bucket.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn sign(
        &self,
        object: &str,
        method: SignedMethod,
        expires_in: Duration,
    ) -> Result<String, SignError>;
}
