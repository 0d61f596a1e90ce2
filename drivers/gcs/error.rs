//! GCS驱动错误类型

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::Interrupted;

/// Errors from loading a service-account credential file.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credentials path not configured")]
    MissingPath,

    #[error("failed to read credentials file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse credentials JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to decode PEM block from private key")]
    PemDecode,

    #[error("failed to parse private key: {0}")]
    KeyParse(String),

    #[error("private key is not an RSA key")]
    UnsupportedKeyType,
}

/// Errors from GCS operations.
#[derive(Debug, Error)]
pub enum GcsError {
    /// Client construction failed; the next call retries.
    #[error("failed to create GCS client: {0}")]
    Init(String),

    #[error("object not found: gs://{bucket}/{name}")]
    NotFound { bucket: String, name: String },

    #[error("GCS API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport or token failure reported by the storage SDK / SDK请求失败
    #[error("GCS request failed: {0}")]
    Storage(#[source] google_cloud_storage::http::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid GCS response: {0}")]
    Decode(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signed URL not available: credentials path not configured for bucket {bucket}")]
    SigningUnavailable { bucket: String },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl GcsError {
    pub fn not_found(bucket: &str, name: &str) -> Self {
        GcsError::NotFound {
            bucket: bucket.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GcsError::NotFound { .. })
    }
}
