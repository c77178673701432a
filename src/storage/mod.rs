mod gcs;
mod signer;

pub use gcs::GcsUrlSigner;
pub use signer::{SignError, SignedMethod, UrlSigner};
