//! Resilient client for the document signing backend
//!
//! The backend exposes one generic call endpoint per tenant. Operation
//! names drift between deployed versions and response envelopes vary in
//! shape, so this module carries an alias table per operation, a
//! normalizer that flattens the known envelope shapes, and a retry loop
//! with exponential backoff for transient failures. Signature
//! submissions are deduplicated with a derived idempotency key.

pub mod client;
pub mod endpoints;
pub mod envelope;
pub mod sync;

pub use client::{BackendClient, ClientStats};
pub use endpoints::{AliasTable, OperationKind};
pub use envelope::{SyncOutcome, SyncResponse};
pub use sync::{IdempotencyKey, OperationRegistry, SubmitCache, SyncOperation};

use thiserror::Error;

use crate::types::{Contact, Document, SignaturePayload};

/// Transport and protocol errors from the signing backend
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request exceeded its timeout budget
    #[error("Request timed out")]
    Timeout,

    /// Server returned an error
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Response body matched no known envelope shape
    #[error("Unrecognized response envelope: {0}")]
    UnrecognizedEnvelope(String),

    /// Backend does not know this operation name
    #[error("Operation not recognized by backend: {0}")]
    UnknownOperation(String),

    /// Write lost an optimistic concurrency race
    #[error("Revision conflict")]
    Conflict,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend evaluated the request and refused it
    #[error("Rejected by backend: {message}")]
    Rejected { message: String },

    /// Retry budget exhausted on a transient failure
    #[error("Gave up after {attempts} attempts: {last_message}")]
    Exhausted { attempts: u32, last_message: String },
}

impl SyncError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Definitive rejections (4xx, conflicts, unknown operations) never
    /// retry; repeating them can only burn the attempt budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Timeout => true,
            SyncError::Server { status, .. } => *status >= 500,
            SyncError::UnrecognizedEnvelope(_) => true,
            SyncError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Document operations against the signing backend
#[async_trait::async_trait]
pub trait SigningBackend: Send + Sync {
    /// Fetch the current state of a document
    async fn fetch_document(&self, document_id: &str)
        -> std::result::Result<Document, SyncError>;

    /// Attach a resolved contact to a slot, guarded by the revision the
    /// caller last observed
    async fn attach_recipient(
        &self,
        document_id: &str,
        slot_index: usize,
        contact: &Contact,
        expected_revision: u64,
    ) -> std::result::Result<Document, SyncError>;

    /// Submit a signature for a signer on a document
    async fn submit_signature(
        &self,
        document_id: &str,
        signer_identity_id: &str,
        payload: &SignaturePayload,
    ) -> std::result::Result<SyncResponse, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Server {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_retryable());
        assert!(SyncError::UnrecognizedEnvelope("garbage".to_string()).is_retryable());

        assert!(!SyncError::Server {
            status: 400,
            message: "bad request".to_string()
        }
        .is_retryable());
        assert!(!SyncError::Conflict.is_retryable());
        assert!(!SyncError::NotFound("doc-1".to_string()).is_retryable());
        assert!(!SyncError::UnknownOperation("sign_doc".to_string()).is_retryable());
        assert!(!SyncError::Rejected {
            message: "not eligible".to_string()
        }
        .is_retryable());
    }
}
